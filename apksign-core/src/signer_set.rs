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

//! Validates the configured signers, picks each one's signature-digest
//! algorithm, and derives the single engine-wide content-digest algorithm.

use std::collections::HashSet;

use apksign_common::{ApkSignError, DigestAlgorithm, Result};
use apksign_v2::SignatureAlgorithmId;

use crate::signer_config::SignerConfig;

/// A validated signer: its configuration, normalized safe name, and the
/// signature-digest algorithm picked for it.
pub struct V1SignerConfig {
    pub config: SignerConfig,
    pub safe_name: String,
    pub signature_digest_algorithm: DigestAlgorithm
}

/// The validated, immutable set of signers for one engine instance.
pub struct SignerSet {
    pub signers: Vec<V1SignerConfig>,
    /// The strongest signature-digest algorithm across all signers; this is
    /// also the algorithm used for v1 content digests (MANIFEST.MF entries).
    pub content_digest_algorithm: DigestAlgorithm
}

impl SignerSet {
    pub fn new(configs: Vec<SignerConfig>, min_sdk_version: i32) -> Result<SignerSet> {
        if configs.is_empty() {
            return Err(ApkSignError::InvalidConfig("at least one signer is required".to_string()));
        }

        let mut seen_safe_names = HashSet::new();
        let mut signers = Vec::with_capacity(configs.len());
        for config in configs {
            let signature_digest_algorithm = select_signature_digest_algorithm(min_sdk_version)?;
            let signer = V1SignerConfig { safe_name: config.safe_name(), config, signature_digest_algorithm };
            if !seen_safe_names.insert(signer.safe_name.clone()) {
                return Err(ApkSignError::InvalidConfig(format!(
                    "two signers normalize to the same safe name {:?}; rename one",
                    signer.safe_name
                )));
            }
            signers.push(signer);
        }

        let content_digest_algorithm =
            DigestAlgorithm::strongest(signers.iter().map(|s| s.signature_digest_algorithm))
                .expect("non-empty signer list guarantees a strongest algorithm");

        Ok(SignerSet { signers, content_digest_algorithm })
    }

    /// `META-INF/MANIFEST.MF`, plus each signer's `.SF` and `.RSA` names, in
    /// the order v1 artifacts are emitted.
    pub fn v1_entry_names(&self) -> Vec<String> {
        let mut names = vec!["META-INF/MANIFEST.MF".to_string()];
        for signer in &self.signers {
            names.push(format!("META-INF/{}.SF", signer.safe_name));
            names.push(format!("META-INF/{}.RSA", signer.safe_name));
        }
        names
    }

    /// The v2 signature-algorithm list used for every signer today: a
    /// function of key type and `min_sdk_version` in principle, but only
    /// RSA+SHA-256 is wired to the leaf builder.
    pub fn v2_algorithms_for(&self, _signer: &V1SignerConfig) -> Vec<SignatureAlgorithmId> {
        vec![SignatureAlgorithmId::RsaSsaPkcs1v15WithSha256]
    }
}

/// RSA/DSA/EC keys at `min_sdk_version < 18` use SHA-1; at `>= 18` use
/// SHA-256 (apksig's published rule). Only RSA keys are actually wired to a
/// leaf-builder signature step today; non-RSA keys still select an algorithm
/// here but fail later with `InvalidKey` when asked to sign.
fn select_signature_digest_algorithm(min_sdk_version: i32) -> Result<DigestAlgorithm> {
    if min_sdk_version < 1 {
        return Err(ApkSignError::InvalidConfig(format!("min_sdk_version must be >= 1, got {min_sdk_version}")));
    }
    Ok(if min_sdk_version < 18 { DigestAlgorithm::Sha1 } else { DigestAlgorithm::Sha256 })
}
