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

//! Scenario-level tests exercising `Engine` end to end, one per testable
//! property rather than per unit.

use apksign_core::{ApkSignError, DigestAlgorithm, Engine, EngineConfigBuilder, InspectionRequest, ManifestInspector, Result, SignerConfig};

struct FixedDebuggable(bool);
impl ManifestInspector for FixedDebuggable {
    fn is_debuggable(&self, _bytes: &[u8]) -> Result<bool> {
        Ok(self.0)
    }
}

fn write_output_entry(engine: &mut Engine, name: &str, bytes: &[u8]) {
    match engine.on_output_entry(name).unwrap() {
        Some(InspectionRequest::Digest(request)) => {
            request.write(bytes).unwrap();
            request.mark_done().unwrap();
        }
        Some(InspectionRequest::Buffer(request)) => {
            request.write(bytes).unwrap();
            request.mark_done().unwrap();
        }
        None => panic!("expected a request for {name:?}, got none"),
        Some(InspectionRequest::FanOut(_)) => panic!("unexpected fan-out request for {name:?}"),
    }
}

fn manifest_text(entries: &[(String, Vec<u8>)]) -> String {
    let (_, bytes) = entries.iter().find(|(n, _)| n == "META-INF/MANIFEST.MF").unwrap();
    String::from_utf8(bytes.clone()).unwrap()
}

fn sf_text<'a>(entries: &'a [(String, Vec<u8>)], safe_name: &str) -> String {
    let (_, bytes) = entries.iter().find(|(n, _)| n == &format!("META-INF/{safe_name}.SF")).unwrap();
    String::from_utf8(bytes.clone()).unwrap()
}

// S1: cold v1+v2, single RSA-2048 signer, minSdk=18.
#[test]
fn s1_cold_v1_and_v2_single_signer_min_sdk_18() {
    let config = EngineConfigBuilder::new()
        .add_signer(SignerConfig::generate_for_testing("alias").unwrap())
        .min_sdk_version(18)
        .build()
        .unwrap();
    let mut engine = Engine::new(config, Box::new(FixedDebuggable(false))).unwrap();

    write_output_entry(&mut engine, "classes.dex", b"dex bytes");
    write_output_entry(&mut engine, "AndroidManifest.xml", b"<manifest/>");

    let artifacts = engine.emit_v1().unwrap().unwrap();
    let names: Vec<_> = artifacts.entries.iter().map(|(n, _)| n.as_str()).collect();
    assert_eq!(names, vec!["META-INF/MANIFEST.MF", "META-INF/ALIAS.SF", "META-INF/ALIAS.RSA"]);

    let manifest = manifest_text(&artifacts.entries);
    let expected_digest_line = format!(
        "SHA-256-Digest: {}",
        base64_encode(&DigestAlgorithm::Sha256.digest(b"dex bytes"))
    );
    assert!(manifest.contains(&expected_digest_line));
    assert!(manifest.contains("X-Android-APK-Signed: 2"));

    for (name, bytes) in &artifacts.entries {
        write_output_entry(&mut engine, name, bytes);
    }
    assert!(engine.emit_v1().unwrap().is_none());

    let entries_region = b"pretend entries region".to_vec();
    let central_directory = b"pretend central directory".to_vec();
    let eocd = fake_eocd(entries_region.len() as u32);
    let v2 = engine.emit_v2(&entries_region, &central_directory, &eocd, true).unwrap().unwrap();

    assert_eq!(&v2.block_bytes[v2.block_bytes.len() - 16..], b"APK Sig Block 42");
    let declared_size = u64::from_le_bytes(v2.block_bytes[0..8].try_into().unwrap());
    assert_eq!(declared_size as usize, v2.block_bytes.len() - 8);

    assert!(engine.commit().is_ok());
}

// S2: algorithm selection across minSdk.
#[test]
fn s2_algorithm_selection_across_min_sdk() {
    let low_config = EngineConfigBuilder::new()
        .add_signer(SignerConfig::generate_for_testing("alias").unwrap())
        .min_sdk_version(7)
        .v2_enabled(false)
        .build()
        .unwrap();
    let mut low = Engine::new(low_config, Box::new(FixedDebuggable(false))).unwrap();
    write_output_entry(&mut low, "classes.dex", b"dex bytes");
    let low_artifacts = low.emit_v1().unwrap().unwrap();
    assert!(manifest_text(&low_artifacts.entries).contains("SHA1-Digest:"));

    let high_config = EngineConfigBuilder::new()
        .add_signer(SignerConfig::generate_for_testing("alias").unwrap())
        .min_sdk_version(18)
        .v2_enabled(false)
        .build()
        .unwrap();
    let mut high = Engine::new(high_config, Box::new(FixedDebuggable(false))).unwrap();
    write_output_entry(&mut high, "classes.dex", b"dex bytes");
    let high_artifacts = high.emit_v1().unwrap().unwrap();
    assert!(manifest_text(&high_artifacts.entries).contains("SHA-256-Digest:"));
}

// S3: duplicate signer names (after safe-name normalization) fail construction.
#[test]
fn s3_duplicate_safe_names_rejected() {
    let config = EngineConfigBuilder::new()
        .add_signer(SignerConfig::generate_for_testing("alias!").unwrap())
        .add_signer(SignerConfig::generate_for_testing("alias?").unwrap())
        .build()
        .unwrap();
    let result = Engine::new(config, Box::new(FixedDebuggable(false)));
    assert!(matches!(result, Err(ApkSignError::InvalidConfig(_))));
}

// S4: replaying a stable output reports nothing to add.
#[test]
fn s4_skip_when_output_is_stable() {
    let config = EngineConfigBuilder::new()
        .add_signer(SignerConfig::generate_for_testing("alias").unwrap())
        .v2_enabled(false)
        .build()
        .unwrap();
    let mut engine = Engine::new(config, Box::new(FixedDebuggable(false))).unwrap();

    write_output_entry(&mut engine, "classes.dex", b"dex bytes");
    let artifacts = engine.emit_v1().unwrap().unwrap();
    for (name, bytes) in &artifacts.entries {
        write_output_entry(&mut engine, name, bytes);
    }

    for (name, bytes) in &artifacts.entries {
        write_output_entry(&mut engine, name, bytes);
    }
    assert!(engine.emit_v1().unwrap().is_none());
}

// S5: modifying a covered entry after v1 emission changes the manifest digest
// line and the .SF's manifest digest on re-emission.
#[test]
fn s5_manifest_change_detection() {
    let config = EngineConfigBuilder::new()
        .add_signer(SignerConfig::generate_for_testing("alias").unwrap())
        .v2_enabled(false)
        .build()
        .unwrap();
    let mut engine = Engine::new(config, Box::new(FixedDebuggable(false))).unwrap();

    write_output_entry(&mut engine, "classes.dex", b"dex bytes v1");
    let first = engine.emit_v1().unwrap().unwrap();
    for (name, bytes) in &first.entries {
        write_output_entry(&mut engine, name, bytes);
    }
    let first_manifest = manifest_text(&first.entries);
    let first_sf = sf_text(&first.entries, "ALIAS");

    write_output_entry(&mut engine, "classes.dex", b"dex bytes v2, totally different");
    let second = engine.emit_v1().unwrap().unwrap();
    let second_manifest = manifest_text(&second.entries);
    let second_sf = sf_text(&second.entries, "ALIAS");

    assert_ne!(first_manifest, second_manifest);
    assert_ne!(first_sf, second_sf);
    let expected_new_digest = format!(
        "SHA-256-Digest: {}",
        base64_encode(&DigestAlgorithm::Sha256.digest(b"dex bytes v2, totally different"))
    );
    assert!(second_manifest.contains(&expected_new_digest));
}

// S6: a debuggable output manifest blocks v1 emission when forbidden.
#[test]
fn s6_debuggable_rejection() {
    let config = EngineConfigBuilder::new()
        .add_signer(SignerConfig::generate_for_testing("alias").unwrap())
        .v2_enabled(false)
        .debuggable_permitted(false)
        .build()
        .unwrap();
    let mut engine = Engine::new(config, Box::new(FixedDebuggable(true))).unwrap();

    write_output_entry(&mut engine, "classes.dex", b"dex bytes");
    write_output_entry(&mut engine, "AndroidManifest.xml", b"<manifest android:debuggable=\"true\"/>");

    assert!(matches!(engine.emit_v1(), Err(ApkSignError::SignatureRefusedDebuggable)));
}

fn fake_eocd(cd_start: u32) -> Vec<u8> {
    let mut eocd = vec![0x50, 0x4B, 0x05, 0x06];
    eocd.extend(std::iter::repeat(0).take(12));
    eocd.extend(cd_start.to_le_bytes());
    eocd.extend(0u16.to_le_bytes());
    eocd
}

/// Minimal base64 (standard alphabet, padded) so this test crate doesn't
/// need its own dependency on a base64 crate just to assert digest lines.
fn base64_encode(bytes: &[u8]) -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let mut out = String::new();
    for chunk in bytes.chunks(3) {
        let b0 = chunk[0];
        let b1 = *chunk.get(1).unwrap_or(&0);
        let b2 = *chunk.get(2).unwrap_or(&0);
        out.push(ALPHABET[(b0 >> 2) as usize] as char);
        out.push(ALPHABET[(((b0 & 0x03) << 4) | (b1 >> 4)) as usize] as char);
        out.push(if chunk.len() > 1 { ALPHABET[(((b1 & 0x0f) << 2) | (b2 >> 6)) as usize] as char } else { '=' });
        out.push(if chunk.len() > 2 { ALPHABET[(b2 & 0x3f) as usize] as char } else { '=' });
    }
    out
}
