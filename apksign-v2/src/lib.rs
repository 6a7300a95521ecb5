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

//! Leaf builder for the APK Signature Scheme v2 block and its enclosing
//! APK Signing Block envelope. Based on
//! <https://source.android.com/docs/security/features/apksigning/v2>.
//!
//! This crate does not know how to read or write ZIP files; it is handed
//! the three already-delimited ZIP sections and per-signer key material by
//! its caller (`apksign-core`'s V2Pipeline) and returns bytes.

mod envelope;
mod hashing;
mod signing;
mod types;

use apksign_common::Result;
use deku::DekuContainerWrite;
use rsa::RsaPrivateKey;

pub use envelope::{wrap_signing_block, ApkSigningBlock, APK_SIGNING_BLOCK_MAGIC};
pub use hashing::compute_top_level_hash;
pub use types::{Sha256Hash, SignatureAlgorithmId};

use types::{len_pfx_u32, Digest, SignedData, Signer, SignatureSchemeV2Block};

/// The APK Signature Scheme v2 block's id within the APK Signing Block.
pub const SIGNATURE_SCHEME_V2_BLOCK_ID: u32 = 0x7109_871a;

/// Key material and algorithm selection for one signer's v2 contribution.
pub struct V2SignerInput<'a> {
    pub private_key: &'a RsaPrivateKey,
    pub public_key_der: Vec<u8>,
    pub certificate_der: Vec<u8>,
    /// Always `[RsaSsaPkcs1v15WithSha256]` today; kept as a list because the
    /// v2 format allows a signer to offer several digest/signature
    /// algorithms and `SignerSet` computes this list per-signer.
    pub algorithms: Vec<SignatureAlgorithmId>
}

/// Builds the serialized APK Signature Scheme v2 block (not yet wrapped in
/// the generic signing-block envelope) covering `top_level_hash` for every
/// signer in `signers`.
pub fn build_signature_scheme_v2_block(
    top_level_hash: Sha256Hash,
    signers: &[V2SignerInput]
) -> Result<Vec<u8>> {
    let mut built_signers = vec![];
    for signer in signers {
        let digests = signer
            .algorithms
            .iter()
            .map(|alg| {
                len_pfx_u32(Digest {
                    signature_algorithm_id: *alg,
                    digest: len_pfx_u32(top_level_hash)
                })
            })
            .collect();

        let signed_data = SignedData {
            digests: len_pfx_u32(digests),
            certificates: len_pfx_u32(vec![len_pfx_u32(signer.certificate_der.clone())]),
            additional_attributes: 0
        };

        let signatures = signer
            .algorithms
            .iter()
            .map(|alg| {
                let signature = signing::sign_with_rsa_sha256(&signed_data, signer.private_key)?;
                Ok(len_pfx_u32(types::Signature {
                    signature_algorithm_id: *alg,
                    signature: len_pfx_u32(signature)
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        built_signers.push(len_pfx_u32(Signer {
            signed_data: len_pfx_u32(signed_data),
            signatures: len_pfx_u32(signatures),
            public_key: len_pfx_u32(signer.public_key_der.clone())
        }));
    }

    let block = SignatureSchemeV2Block {
        signers: len_pfx_u32(built_signers)
    };
    Ok(block.to_bytes()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::{pkcs8::EncodePublicKey, RsaPublicKey};

    fn test_key() -> RsaPrivateKey {
        // A 1024-bit key keeps this unit test fast; the engine itself
        // validates real-world key size requirements before ever reaching
        // this crate.
        RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap()
    }

    #[test]
    fn block_round_trips_through_deku_without_panicking() {
        let key = test_key();
        let public_key = RsaPublicKey::from(&key);
        let signer = V2SignerInput {
            private_key: &key,
            public_key_der: public_key.to_public_key_der().unwrap().as_ref().to_vec(),
            certificate_der: vec![0x30, 0x03, 0x02, 0x01, 0x00],
            algorithms: vec![SignatureAlgorithmId::RsaSsaPkcs1v15WithSha256]
        };
        let hash = [7u8; 32];
        let block = build_signature_scheme_v2_block(hash, &[signer]).unwrap();
        assert!(!block.is_empty());

        let envelope = wrap_signing_block(vec![(SIGNATURE_SCHEME_V2_BLOCK_ID, block)]).unwrap();
        let bytes = envelope.to_bytes().unwrap();
        assert_eq!(&bytes[bytes.len() - 16..], APK_SIGNING_BLOCK_MAGIC);
        assert_eq!(envelope.size_of_self_not_counted, envelope.size_of_self_counted);
    }
}
