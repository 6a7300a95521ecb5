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

//! The JAR-signature (v1) content/signature digest algorithm, shared
//! between `apksign-core` (which selects it per §4.2's strongest-of rule)
//! and `apksign-v1` (which formats it into MANIFEST.MF/`.SF` attribute
//! names). Declared in this shared crate, rather than in `apksign-core`, so
//! the leaf builder doesn't need to depend on the orchestrator to agree on
//! names.
//!
//! Variant declaration order is the total order used by the "strongest of
//! all signers' signature digests" rule: later variants are stronger.
use sha1::Sha1;
use sha2::{Digest as _, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DigestAlgorithm {
    Sha1,
    Sha256
}

impl DigestAlgorithm {
    /// The JAR manifest attribute name for this algorithm, e.g.
    /// `SHA-256-Digest` or `SHA1-Digest`.
    pub fn manifest_attribute_name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA1-Digest",
            DigestAlgorithm::Sha256 => "SHA-256-Digest"
        }
    }

    /// The attribute name used for the digest of the whole manifest inside
    /// a `.SF` file, e.g. `SHA-256-Digest-Manifest`.
    pub fn manifest_digest_attribute_name(&self) -> &'static str {
        match self {
            DigestAlgorithm::Sha1 => "SHA1-Digest-Manifest",
            DigestAlgorithm::Sha256 => "SHA-256-Digest-Manifest"
        }
    }

    pub fn digest(&self, data: impl AsRef<[u8]>) -> Vec<u8> {
        match self {
            DigestAlgorithm::Sha1 => Sha1::digest(data).to_vec(),
            DigestAlgorithm::Sha256 => Sha256::digest(data).to_vec()
        }
    }

    /// Picks the strongest of a non-empty set of algorithms.
    pub fn strongest(algorithms: impl IntoIterator<Item = DigestAlgorithm>) -> Option<DigestAlgorithm> {
        algorithms.into_iter().max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_outranks_sha1() {
        assert!(DigestAlgorithm::Sha256 > DigestAlgorithm::Sha1);
    }

    #[test]
    fn strongest_picks_sha256_when_mixed() {
        let picked = DigestAlgorithm::strongest([DigestAlgorithm::Sha1, DigestAlgorithm::Sha256, DigestAlgorithm::Sha1]);
        assert_eq!(picked, Some(DigestAlgorithm::Sha256));
    }

    #[test]
    fn strongest_of_empty_is_none() {
        assert_eq!(DigestAlgorithm::strongest(std::iter::empty()), None);
    }

    #[test]
    fn digest_lengths_match_algorithm() {
        assert_eq!(DigestAlgorithm::Sha1.digest(b"x").len(), 20);
        assert_eq!(DigestAlgorithm::Sha256.digest(b"x").len(), 32);
    }
}
