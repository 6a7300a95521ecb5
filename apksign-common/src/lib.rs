// Copyright 2024 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use core::fmt;
use std::{io, rc::Rc};

use deku::prelude::*;
use rsa::pkcs8;

mod algorithms;
pub use algorithms::DigestAlgorithm;

/// Common error type shared between the apksign engine crates.
///
/// In general designed to avoid needing utilities like `map_err`.
#[derive(Debug, Clone)]
pub enum ApkSignError {
    /// Signer list was empty, or two signers' safe names collided, or
    /// `created_by` was empty.
    InvalidConfig(String),
    /// A signer's key/size is not usable for the requested `min_sdk_version`.
    InvalidKey(String),
    /// A requested feature is recognized but not implemented yet.
    Unsupported(String),
    /// An engine operation was called out of order: after `close()`, before
    /// its prerequisites were satisfied, or before pending inspection
    /// requests were marked done.
    StateViolation(String),
    /// Emission was blocked because the output APK is debuggable and the
    /// engine's configuration forbids signing debuggable APKs.
    SignatureRefusedDebuggable,
    /// A referenced input (the input manifest, the output AndroidManifest)
    /// could not be parsed.
    Format(String),
    /// The v1 or v2 leaf builder failed: certificate encoding, signature
    /// computation, or similar.
    Crypto(String),
    /// I/O failed while the driver streamed entry bytes.
    Io(Rc<io::Error>),
    /// Byte serialisation of a `deku`-derived wire structure failed. See
    /// [DekuError].
    BytesSerialization(DekuError),
    /// A `.pem` string did not parse as valid syntax.
    Pem(Rc<pem::PemError>),
    /// An RSA private key could not be parsed from PKCS#8 DER.
    RsaKey(pkcs8::Error),
    /// RSA signing failed, see [rsa::Error].
    RsaSigning(Rc<rsa::Error>),
    /// RSA public key serialisation failed, see [pkcs8::spki::Error].
    RsaKeyEncoding(pkcs8::spki::Error),
    /// A certificate could not be decoded from its ASN.1 DER form.
    Asn1Decode(Rc<rasn::error::DecodeError>),
    /// A PKCS#7 `SignedData` structure could not be encoded.
    Asn1Encode(Rc<rasn::error::EncodeError>)
}

/// Result type where the error is always [ApkSignError].
pub type Result<T> = std::result::Result<T, ApkSignError>;

impl fmt::Display for ApkSignError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use ApkSignError::*;
        match self {
            InvalidConfig(msg) => write!(f, "Invalid signing configuration: {msg}"),
            InvalidKey(msg) => write!(f, "Unusable signing key: {msg}"),
            Unsupported(feature) => write!(f, "Unsupported: {feature}"),
            StateViolation(msg) => write!(f, "Engine state violation: {msg}"),
            SignatureRefusedDebuggable => write!(f, "Refusing to sign: output APK declares android:debuggable=\"true\" and the engine's configuration forbids signing debuggable APKs."),
            Format(msg) => write!(f, "Failed to parse input: {msg}"),
            Crypto(msg) => write!(f, "Signing failed: {msg}"),
            Io(io_err) => write!(f, "I/O failed while streaming entry bytes.\nInternal error: {io_err:?}"),
            BytesSerialization(deku_error) => write!(f, "Failed to get byte representation of a signing structure.\nInternal error: {deku_error:?}"),
            Pem(pem_error) => write!(f, "A signing .pem was provided, but it didn't parse as valid syntax.\nInternal error: {pem_error:?}"),
            RsaKey(pkcs_error) => write!(f, "RSA Private Key parsing failed.\nInternal error: {pkcs_error:?}"),
            RsaSigning(rsa_error) => write!(f, "RSA signing failed.\nInternal error: {rsa_error:?}"),
            RsaKeyEncoding(pkcs_error) => write!(f, "Failed to serialise RSA public key.\nInternal error: {pkcs_error:?}"),
            Asn1Decode(decode_error) => write!(f, "Failed to decode a certificate.\nInternal error: {decode_error:?}"),
            Asn1Encode(encode_error) => write!(f, "Failed to encode a PKCS#7 signature.\nInternal error: {encode_error:?}"),
        }
    }
}

impl std::error::Error for ApkSignError {}

// Automatic conversion from other types of error to ApkSignError makes the
// rest of the code cleaner.
impl From<io::Error> for ApkSignError {
    fn from(value: io::Error) -> Self {
        ApkSignError::Io(value.into())
    }
}

impl From<DekuError> for ApkSignError {
    fn from(value: DekuError) -> Self {
        ApkSignError::BytesSerialization(value)
    }
}

impl From<pem::PemError> for ApkSignError {
    fn from(value: pem::PemError) -> Self {
        ApkSignError::Pem(value.into())
    }
}

impl From<pkcs8::Error> for ApkSignError {
    fn from(value: pkcs8::Error) -> Self {
        ApkSignError::RsaKey(value)
    }
}

impl From<rsa::Error> for ApkSignError {
    fn from(value: rsa::Error) -> Self {
        ApkSignError::RsaSigning(value.into())
    }
}

impl From<pkcs8::spki::Error> for ApkSignError {
    fn from(value: pkcs8::spki::Error) -> Self {
        ApkSignError::RsaKeyEncoding(value)
    }
}

impl From<rasn::error::DecodeError> for ApkSignError {
    fn from(value: rasn::error::DecodeError) -> Self {
        ApkSignError::Asn1Decode(value.into())
    }
}

impl From<rasn::error::EncodeError> for ApkSignError {
    fn from(value: rasn::error::EncodeError) -> Self {
        ApkSignError::Asn1Encode(value.into())
    }
}
