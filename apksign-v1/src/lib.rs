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

//! Builds the files of Android APK Signature Scheme v1, i.e. the signed JAR
//! manifest format: `META-INF/MANIFEST.MF`, one `META-INF/<NAME>.SF` and one
//! `META-INF/<NAME>.RSA` per signer.
//!
//! This crate never reads archive entry bytes itself; it is handed digests
//! that have already been computed from them, so it has no opinion on how
//! entries are streamed or chunked.

mod manifest;
mod pkcs7;

use std::collections::BTreeMap;

use apksign_common::{ApkSignError, DigestAlgorithm, Result};
use rsa::RsaPrivateKey;

pub use manifest::manifest_entry;

/// One signer's key material, used to produce its `.SF` and `.RSA` files.
pub struct V1SignerInput<'a> {
    /// Filesystem-safe basename used for `META-INF/<safe_name>.SF` /
    /// `.RSA`, e.g. `"ALIAS"`.
    pub safe_name: String,
    pub private_key: &'a RsaPrivateKey,
    pub certificate_der: Vec<u8>,
    /// Digest algorithm used both for this signer's `.SF` file and for
    /// signing it; independent of `content_digest_algorithm`.
    pub signature_digest_algorithm: DigestAlgorithm
}

/// Builds `MANIFEST.MF` plus a `.SF`/`.RSA` pair per signer.
///
/// Entries are emitted in a fixed order: the manifest first, then each
/// signer's `.SF`, then that signer's `.RSA`, in the order `signers` is
/// given. This matches the order the driver is expected to write artifacts
/// in (see the engine's output-ordering guarantee).
pub fn build_manifest_and_signatures(
    signers: &[V1SignerInput],
    content_digest_algorithm: DigestAlgorithm,
    entry_digests: &BTreeMap<String, Vec<u8>>,
    applied_schemes: &[u8],
    input_main_section: Option<&str>,
    created_by: &str
) -> Result<Vec<(String, Vec<u8>)>> {
    if signers.is_empty() {
        return Err(ApkSignError::InvalidConfig("at least one signer is required".to_string()));
    }

    let manifest_text = manifest::build_manifest(content_digest_algorithm, entry_digests, applied_schemes, input_main_section);
    let mut artifacts = Vec::with_capacity(1 + signers.len() * 2);
    artifacts.push(("META-INF/MANIFEST.MF".to_string(), manifest_text.clone().into_bytes()));

    for signer in signers {
        let sig_file = manifest::build_signature_file(
            signer.signature_digest_algorithm,
            content_digest_algorithm,
            &manifest_text,
            entry_digests,
            created_by,
            applied_schemes
        );
        let pkcs7_bytes = pkcs7::build_pkcs7(
            signer.signature_digest_algorithm,
            &sig_file,
            signer.private_key,
            &signer.certificate_der
        )?;
        artifacts.push((format!("META-INF/{}.SF", signer.safe_name), sig_file.into_bytes()));
        artifacts.push((format!("META-INF/{}.RSA", signer.safe_name), pkcs7_bytes));
    }

    Ok(artifacts)
}

/// Recomputes just the manifest text, without signing anything. Used by the
/// engine to decide whether a previous emission's manifest is still current
/// (see the "manifest-changed" vs. "manifest-stable" branches of the v1
/// pipeline).
pub fn build_manifest_only(
    content_digest_algorithm: DigestAlgorithm,
    entry_digests: &BTreeMap<String, Vec<u8>>,
    applied_schemes: &[u8],
    input_main_section: Option<&str>
) -> Vec<u8> {
    manifest::build_manifest(content_digest_algorithm, entry_digests, applied_schemes, input_main_section).into_bytes()
}
