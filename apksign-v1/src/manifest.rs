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

//! `MANIFEST.MF` and per-signer `.SF` text construction.

use std::collections::BTreeMap;

use apksign_common::DigestAlgorithm;
use base64::{prelude::BASE64_STANDARD, Engine};

/// Builds the `MANIFEST.MF` main section plus one entry per already-digested
/// output file.
///
/// `entry_digests` is keyed by archive entry name; iteration is in `BTreeMap`
/// order, which keeps output deterministic regardless of the order entries
/// were observed in.
///
/// When `input_main_section` is given (the input JAR's `MANIFEST.MF` main
/// section, verbatim, ending in a blank line), it is reused as-is in place
/// of a fresh `Manifest-Version` header, so non-signing attributes the input
/// carried (e.g. a tool-specific `Created-By`) round-trip into the output.
/// The engine's own `X-Android-APK-Signed` header is still appended after it.
pub fn build_manifest(
    content_digest_algorithm: DigestAlgorithm,
    entry_digests: &BTreeMap<String, Vec<u8>>,
    applied_schemes: &[u8],
    input_main_section: Option<&str>
) -> String {
    let schemes = applied_schemes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let mut manifest = match input_main_section {
        Some(main_section) => format!("{main_section}X-Android-APK-Signed: {schemes}\r\n\r\n"),
        None => format!("Manifest-Version: 1.0\r\nX-Android-APK-Signed: {schemes}\r\n\r\n")
    };
    for (name, digest) in entry_digests {
        manifest.push_str(&manifest_entry(content_digest_algorithm, name, digest));
    }
    manifest
}

/// The per-entry section shared between `MANIFEST.MF` and (by re-digesting
/// this same text) `.SF` construction.
pub fn manifest_entry(algorithm: DigestAlgorithm, name: &str, digest: &[u8]) -> String {
    let attr = algorithm.manifest_attribute_name();
    let b64 = BASE64_STANDARD.encode(digest);
    format!("Name: {name}\r\n{attr}: {b64}\r\n\r\n")
}

/// Builds a signer's `.SF` file: a header naming the digest of the manifest
/// itself, followed by one entry per manifest entry mirroring its digest.
///
/// `manifest_entries`, rather than the manifest text as a whole, so this can
/// be recomputed without re-parsing `MANIFEST.MF` when only the signer
/// changes and the manifest does not.
pub fn build_signature_file(
    signature_digest_algorithm: DigestAlgorithm,
    content_digest_algorithm: DigestAlgorithm,
    manifest_bytes: &str,
    manifest_entries: &BTreeMap<String, Vec<u8>>,
    created_by: &str,
    applied_schemes: &[u8]
) -> String {
    let manifest_digest_attr = signature_digest_algorithm.manifest_digest_attribute_name();
    let manifest_digest = BASE64_STANDARD.encode(signature_digest_algorithm.digest(manifest_bytes));
    let schemes = applied_schemes
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    let mut sf = format!(
        "Signature-Version: 1.0\r\nCreated-By: {created_by}\r\n{manifest_digest_attr}: {manifest_digest}\r\nX-Android-APK-Signed: {schemes}\r\n\r\n"
    );
    for (name, digest) in manifest_entries {
        let entry_text = manifest_entry(content_digest_algorithm, name, digest);
        let entry_digest = BASE64_STANDARD.encode(signature_digest_algorithm.digest(&entry_text));
        let attr = signature_digest_algorithm.manifest_attribute_name();
        sf.push_str(&format!("Name: {name}\r\n{attr}: {entry_digest}\r\n\r\n"));
    }
    sf
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digests() -> BTreeMap<String, Vec<u8>> {
        let mut map = BTreeMap::new();
        map.insert("classes.dex".to_string(), DigestAlgorithm::Sha256.digest(b"dex-bytes"));
        map.insert("res/layout/main.xml".to_string(), DigestAlgorithm::Sha256.digest(b"xml-bytes"));
        map
    }

    #[test]
    fn manifest_lists_entries_in_sorted_order() {
        let manifest = build_manifest(DigestAlgorithm::Sha256, &digests(), &[2], None);
        let dex_pos = manifest.find("classes.dex").unwrap();
        let xml_pos = manifest.find("res/layout/main.xml").unwrap();
        assert!(dex_pos < xml_pos);
        assert!(manifest.starts_with("Manifest-Version: 1.0\r\n"));
    }

    #[test]
    fn signature_file_is_deterministic_given_same_manifest() {
        let manifest = build_manifest(DigestAlgorithm::Sha256, &digests(), &[2], None);
        let sf_a = build_signature_file(DigestAlgorithm::Sha256, DigestAlgorithm::Sha256, &manifest, &digests(), "1.0 (Android)", &[2]);
        let sf_b = build_signature_file(DigestAlgorithm::Sha256, DigestAlgorithm::Sha256, &manifest, &digests(), "1.0 (Android)", &[2]);
        assert_eq!(sf_a, sf_b);
        assert!(sf_a.contains("SHA-256-Digest-Manifest:"));
    }

    #[test]
    fn sha1_signature_file_uses_sha1_attribute_names() {
        let manifest = build_manifest(DigestAlgorithm::Sha256, &digests(), &[2], None);
        let sf = build_signature_file(DigestAlgorithm::Sha1, DigestAlgorithm::Sha256, &manifest, &digests(), "1.0 (Android)", &[2]);
        assert!(sf.contains("SHA1-Digest-Manifest:"));
        assert!(sf.contains("SHA1-Digest:"));
        assert!(!sf.contains("SHA-256-Digest"));
    }
}
