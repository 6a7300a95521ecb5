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

//! One signer's identity: a name, an RSA key pair, and a certificate chain.

use apksign_common::{ApkSignError, Result};
use rsa::pkcs8::DecodePrivateKey;
use rsa::{RsaPrivateKey, RsaPublicKey};

/// A signer as the driver configures it: a logical name plus key material.
///
/// `cert_chain` is ordered leaf-first, ASN.1 DER form; `cert_chain[0]`'s
/// public key is expected (not verified here) to match `private_key`.
pub struct SignerConfig {
    pub name: String,
    pub private_key: RsaPrivateKey,
    pub public_key: RsaPublicKey,
    pub cert_chain: Vec<Vec<u8>>
}

impl SignerConfig {
    /// Parses a signer's key and leaf certificate out of a combined `.pem`
    /// string containing one `BEGIN PRIVATE KEY` and one `BEGIN CERTIFICATE`
    /// section.
    pub fn from_combined_pem_string(name: impl Into<String>, combined_pem: &str) -> Result<SignerConfig> {
        let mut certificate = None;
        let mut private_key_bytes = None;
        for part in pem::parse_many(combined_pem)? {
            match part.tag() {
                "CERTIFICATE" => certificate = Some(part.into_contents()),
                "PRIVATE KEY" => private_key_bytes = Some(part.into_contents()),
                _ => {}
            }
        }
        let certificate = certificate
            .ok_or_else(|| ApkSignError::InvalidConfig("combined .pem has no CERTIFICATE section".to_string()))?;
        let private_key_bytes = private_key_bytes
            .ok_or_else(|| ApkSignError::InvalidConfig("combined .pem has no PRIVATE KEY section".to_string()))?;
        let private_key = RsaPrivateKey::from_pkcs8_der(&private_key_bytes)?;
        let public_key = RsaPublicKey::from(&private_key);

        Ok(SignerConfig { name: name.into(), private_key, public_key, cert_chain: vec![certificate] })
    }

    /// Randomly generates an RSA key pair and a self-signed throwaway
    /// certificate. Only enabled under the `cert-gen` feature (on by
    /// default); slow (~100ms+) and unsuitable for anything beyond local
    /// testing, since Play Store app updates require a stable signing key.
    #[cfg(feature = "cert-gen")]
    pub fn generate_for_testing(name: impl Into<String>) -> Result<SignerConfig> {
        use rand::prelude::*;
        use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
        use rsa::pkcs8::{EncodePrivateKey, LineEnding};

        let name = name.into();
        let private_key = RsaPrivateKey::new(&mut thread_rng(), 2048)?;
        let public_key = RsaPublicKey::from(&private_key);
        let private_key_pem = private_key.to_pkcs8_pem(LineEnding::LF)?.to_string();

        let key_pair = KeyPair::from_pem(&private_key_pem)
            .map_err(|e| ApkSignError::Crypto(format!("rcgen rejected a freshly generated key: {e:?}")))?;
        let mut distinguished_name = DistinguishedName::new();
        distinguished_name.push(DnType::CommonName, name.clone());
        let mut cert_params = CertificateParams::new(vec![])
            .map_err(|e| ApkSignError::Crypto(format!("certificate params: {e:?}")))?;
        cert_params.distinguished_name = distinguished_name;
        let cert = cert_params
            .self_signed(&key_pair)
            .map_err(|e| ApkSignError::Crypto(format!("self-signing failed: {e:?}")))?;

        Ok(SignerConfig { name, private_key, public_key, cert_chain: vec![cert.der().to_vec()] })
    }

    /// The on-disk basename used for this signer's `.SF`/`.RSA` files:
    /// uppercase, restricted to `[A-Z0-9_]`, truncated to 8 characters.
    pub fn safe_name(&self) -> String {
        let upper: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        upper.chars().take(8).collect()
    }
}
