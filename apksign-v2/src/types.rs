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

// Types involved in the APK Signature Scheme v2 block.
// Named according to the APK Signature Scheme v2 doc.
use deku::prelude::*;

pub type Sha256Hash = [u8; 32];

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SignatureSchemeV2Block {
    pub signers: U32LengthPrefixed<Vec<U32LengthPrefixed<Signer>>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct Signer {
    pub signed_data: U32LengthPrefixed<SignedData>,
    pub signatures: U32LengthPrefixed<Vec<U32LengthPrefixed<Signature>>>,
    // SubjectPublicKeyInfo, ASN.1 DER form
    pub public_key: U32LengthPrefixed<Vec<u8>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct Signature {
    pub signature_algorithm_id: SignatureAlgorithmId,
    pub signature: U32LengthPrefixed<Vec<u8>>
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct SignedData {
    pub digests: U32LengthPrefixed<Vec<U32LengthPrefixed<Digest>>>,
    // Array of X.509 Certificates (ASN.1 DER form) as bytes
    pub certificates: U32LengthPrefixed<Vec<U32LengthPrefixed<Vec<u8>>>>,
    // No APK Signature Scheme v2 additional attributes are emitted.
    pub additional_attributes: u32
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct Digest {
    pub signature_algorithm_id: SignatureAlgorithmId,
    pub digest: U32LengthPrefixed<Sha256Hash>
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, DekuWrite, Clone, Copy)]
#[deku(id_type = "u32")]
pub enum SignatureAlgorithmId {
    #[deku(id = 0x0103)]
    RsaSsaPkcs1v15WithSha256
}

// Helper structures

// The "Integrity-protected contents" block uses u32 lengths throughout v2.
#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct U32LengthPrefixed<T: DekuWriter> {
    pub length: u32,
    pub value: T
}

#[derive(Debug, PartialEq, DekuWrite, Clone)]
pub struct RawWrapper<T: DekuWriter> {
    pub value: T
}

// Constructs a length-prefixed thing by serialising it once to learn its length.
pub fn len_pfx_u32<T: DekuWriter + Clone>(thing: T) -> U32LengthPrefixed<T> {
    let wrap = RawWrapper {
        value: thing.clone()
    };

    U32LengthPrefixed {
        length: wrap.to_bytes().unwrap().len() as u32,
        value: thing
    }
}
