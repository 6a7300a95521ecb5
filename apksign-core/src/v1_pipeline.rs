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

//! Tracks per-entry content digests, the previously emitted v1 artifacts,
//! and the input manifest's main section; decides when to (re)generate the
//! JAR signature files.

use std::collections::BTreeMap;
use std::sync::Arc;

use apksign_common::{ApkSignError, DigestAlgorithm, Result};

use crate::inspection::{BufferRequest, DigestRequest};
use crate::signer_set::SignerSet;

/// Artifacts the driver must write, in order, as a result of `emit`.
pub struct V1Artifacts {
    pub entries: Vec<(String, Vec<u8>)>
}

pub struct V1Pipeline {
    pending_digests: BTreeMap<String, Arc<DigestRequest>>,
    output_digests: BTreeMap<String, Vec<u8>>,
    signature_buffers: BTreeMap<String, Arc<BufferRequest>>,
    emitted: BTreeMap<String, Vec<u8>>,
    input_manifest_request: Option<Arc<BufferRequest>>,
    input_manifest_main_section: Option<String>,
    pending: bool
}

impl V1Pipeline {
    pub fn new() -> V1Pipeline {
        V1Pipeline {
            pending_digests: BTreeMap::new(),
            output_digests: BTreeMap::new(),
            signature_buffers: BTreeMap::new(),
            emitted: BTreeMap::new(),
            input_manifest_request: None,
            input_manifest_main_section: None,
            pending: true
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Opens the digest sink for a v1-covered output entry and returns the
    /// shared handle the driver streams bytes into; the pipeline keeps its
    /// own clone to read the digest back once done.
    pub fn open_digest_request(&mut self, name: &str, algorithm: DigestAlgorithm) -> Arc<DigestRequest> {
        let request = Arc::new(DigestRequest::new(algorithm));
        self.pending_digests.insert(name.to_string(), request.clone());
        self.output_digests.remove(name);
        self.pending = true;
        request
    }

    pub fn digest_request(&self, name: &str) -> Option<&DigestRequest> {
        self.pending_digests.get(name).map(Arc::as_ref)
    }

    /// Records a content digest computed outside the usual `DigestRequest`
    /// flow, e.g. `AndroidManifest.xml`'s digest, derived from the same
    /// buffered bytes the debuggable policy already inspected rather than
    /// from a second, independently streamed digest sink.
    pub fn set_output_digest(&mut self, name: &str, digest: Vec<u8>) {
        self.output_digests.insert(name.to_string(), digest);
        self.pending = true;
    }

    /// Opens a buffer sink for an engine-owned entry, so a later `emit` can
    /// compare driver-written bytes against what was previously emitted.
    pub fn open_signature_buffer(&mut self, name: &str) -> Arc<BufferRequest> {
        let request = Arc::new(BufferRequest::new());
        self.signature_buffers.insert(name.to_string(), request.clone());
        request
    }

    pub fn signature_buffer(&self, name: &str) -> Option<&BufferRequest> {
        self.signature_buffers.get(name).map(Arc::as_ref)
    }

    /// Opens the buffer sink used to cache the input `MANIFEST.MF`'s main
    /// section, returning the shared handle the driver writes into.
    pub fn open_input_manifest_request(&mut self) -> Arc<BufferRequest> {
        let request = Arc::new(BufferRequest::new());
        self.input_manifest_request = Some(request.clone());
        request
    }

    pub fn input_manifest_request(&self) -> Option<&BufferRequest> {
        self.input_manifest_request.as_deref()
    }

    pub fn remove_entry(&mut self, name: &str) {
        self.pending_digests.remove(name);
        self.output_digests.remove(name);
        self.signature_buffers.remove(name);
        self.pending = true;
    }

    /// Runs the signature-generation protocol described for `emit_v1`.
    /// Returns `None` when nothing new needs to be written (manifest-stable,
    /// all previously emitted bytes already match).
    pub fn emit(
        &mut self,
        signer_set: &SignerSet,
        applied_schemes: &[u8],
        created_by: &str
    ) -> Result<Option<V1Artifacts>> {
        if let Some(request) = &self.input_manifest_request {
            if !request.is_done() {
                return Err(ApkSignError::StateViolation(
                    "the input MANIFEST.MF buffer request has not been marked done".to_string()
                ));
            }
        }
        if self.pending_digests.values().any(|r| !r.is_done()) {
            return Err(ApkSignError::StateViolation(
                "not every v1-covered output entry's digest request has been marked done".to_string()
            ));
        }

        self.consolidate_digests()?;
        self.consolidate_input_manifest()?;

        if self.emitted.is_empty() {
            return self.emit_cold(signer_set, applied_schemes, created_by).map(Some);
        }

        let regenerated_manifest = apksign_v1::build_manifest_only(
            signer_set.content_digest_algorithm,
            &self.output_digests,
            applied_schemes,
            self.input_manifest_main_section.as_deref()
        );
        let previous_manifest = self.emitted.get("META-INF/MANIFEST.MF");

        if previous_manifest != Some(&regenerated_manifest) {
            return self.emit_cold(signer_set, applied_schemes, created_by).map(Some);
        }

        self.emit_manifest_stable()
    }

    fn consolidate_digests(&mut self) -> Result<()> {
        let finished: Vec<String> = self.pending_digests.keys().cloned().collect();
        for name in finished {
            let request = self.pending_digests.remove(&name).expect("key just read from the same map");
            self.output_digests.insert(name, request.take_digest()?);
        }
        Ok(())
    }

    fn consolidate_input_manifest(&mut self) -> Result<()> {
        let Some(request) = self.input_manifest_request.take() else {
            return Ok(());
        };
        let bytes = request.take_bytes()?;
        let text = String::from_utf8(bytes)
            .map_err(|_| ApkSignError::Format("input MANIFEST.MF is not valid UTF-8".to_string()))?;
        // The main section ends at the first entry's blank-line separator.
        let main_section = match text.split_once("\r\n\r\n") {
            Some((main, _)) => format!("{main}\r\n\r\n"),
            None => text
        };
        self.input_manifest_main_section = Some(main_section);
        Ok(())
    }

    fn emit_cold(&mut self, signer_set: &SignerSet, applied_schemes: &[u8], created_by: &str) -> Result<V1Artifacts> {
        let signer_inputs: Vec<apksign_v1::V1SignerInput> = signer_set
            .signers
            .iter()
            .map(|signer| apksign_v1::V1SignerInput {
                safe_name: signer.safe_name.clone(),
                private_key: &signer.config.private_key,
                certificate_der: signer.config.cert_chain[0].clone(),
                signature_digest_algorithm: signer.signature_digest_algorithm
            })
            .collect();

        let entries = apksign_v1::build_manifest_and_signatures(
            &signer_inputs,
            signer_set.content_digest_algorithm,
            &self.output_digests,
            applied_schemes,
            self.input_manifest_main_section.as_deref(),
            created_by
        )?;

        self.emitted = entries.iter().cloned().collect();
        for (name, _) in &entries {
            self.signature_buffers.entry(name.clone()).or_insert_with(|| Arc::new(BufferRequest::new()));
        }
        self.pending = true;
        Ok(V1Artifacts { entries })
    }

    fn emit_manifest_stable(&mut self) -> Result<Option<V1Artifacts>> {
        let mut mismatched = Vec::new();
        for (name, expected_bytes) in &self.emitted {
            let observed = self.signature_buffers.get(name).and_then(|b| b.peek_bytes().ok());
            if observed.as_ref() != Some(expected_bytes) {
                mismatched.push(name.clone());
            }
        }

        if mismatched.is_empty() {
            self.pending = false;
            return Ok(None);
        }

        let mut entries = Vec::with_capacity(mismatched.len());
        for name in mismatched {
            if let Some(bytes) = self.emitted.get(&name) {
                entries.push((name, bytes.clone()));
            }
        }
        self.pending = true;
        Ok(Some(V1Artifacts { entries }))
    }

    /// Checked by `commit()`: every previously emitted entry must have a
    /// matching, done buffer observed from the driver.
    pub fn verify_finalized(&mut self) -> Result<()> {
        if self.emitted.is_empty() {
            self.pending = false;
            return Ok(());
        }
        for (name, expected_bytes) in &self.emitted {
            let observed = self.signature_buffers.get(name).and_then(|b| b.peek_bytes().ok());
            if observed.as_ref() != Some(expected_bytes) {
                return Err(ApkSignError::StateViolation(format!(
                    "entry {name:?} was emitted by v1 signing but the driver never wrote matching bytes back"
                )));
            }
        }
        self.pending = false;
        Ok(())
    }
}

impl Default for V1Pipeline {
    fn default() -> Self {
        V1Pipeline::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer_config::SignerConfig;

    fn signer_set() -> SignerSet {
        SignerSet::new(vec![SignerConfig::generate_for_testing("alias").unwrap()], 24).unwrap()
    }

    #[test]
    fn cold_emit_produces_manifest_then_sf_then_rsa() {
        let mut pipeline = V1Pipeline::new();
        pipeline.open_digest_request("classes.dex", DigestAlgorithm::Sha256);
        pipeline.digest_request("classes.dex").unwrap().write(b"dex bytes").unwrap();
        pipeline.digest_request("classes.dex").unwrap().mark_done().unwrap();

        let artifacts = pipeline.emit(&signer_set(), &[2], "1.0 (Android)").unwrap().unwrap();
        let names: Vec<_> = artifacts.entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["META-INF/MANIFEST.MF", "META-INF/ALIAS.SF", "META-INF/ALIAS.RSA"]);
    }

    #[test]
    fn emit_fails_if_a_digest_request_is_not_done() {
        let mut pipeline = V1Pipeline::new();
        pipeline.open_digest_request("classes.dex", DigestAlgorithm::Sha256);
        let result = pipeline.emit(&signer_set(), &[2], "1.0 (Android)");
        assert!(matches!(result, Err(ApkSignError::StateViolation(_))));
    }

    #[test]
    fn manifest_stable_with_matching_buffers_reports_nothing_to_add() {
        let mut pipeline = V1Pipeline::new();
        pipeline.open_digest_request("classes.dex", DigestAlgorithm::Sha256);
        pipeline.digest_request("classes.dex").unwrap().write(b"dex bytes").unwrap();
        pipeline.digest_request("classes.dex").unwrap().mark_done().unwrap();
        let signer_set = signer_set();
        let artifacts = pipeline.emit(&signer_set, &[2], "1.0 (Android)").unwrap().unwrap();

        for (name, bytes) in &artifacts.entries {
            let buffer = pipeline.signature_buffer(name).unwrap();
            buffer.write(bytes).unwrap();
            buffer.mark_done().unwrap();
        }

        let result = pipeline.emit(&signer_set, &[2], "1.0 (Android)").unwrap();
        assert!(result.is_none());
        assert!(!pipeline.is_pending());
    }

    #[test]
    fn verify_finalized_fails_when_driver_never_wrote_back_emitted_entries() {
        let mut pipeline = V1Pipeline::new();
        pipeline.open_digest_request("classes.dex", DigestAlgorithm::Sha256);
        pipeline.digest_request("classes.dex").unwrap().write(b"dex bytes").unwrap();
        pipeline.digest_request("classes.dex").unwrap().mark_done().unwrap();
        pipeline.emit(&signer_set(), &[2], "1.0 (Android)").unwrap();

        assert!(matches!(pipeline.verify_finalized(), Err(ApkSignError::StateViolation(_))));
    }

    #[test]
    fn removing_an_entry_reasserts_pending() {
        let mut pipeline = V1Pipeline::new();
        pipeline.open_digest_request("classes.dex", DigestAlgorithm::Sha256);
        pipeline.digest_request("classes.dex").unwrap().write(b"dex bytes").unwrap();
        pipeline.digest_request("classes.dex").unwrap().mark_done().unwrap();
        let signer_set = signer_set();
        let artifacts = pipeline.emit(&signer_set, &[2], "1.0 (Android)").unwrap().unwrap();
        for (name, bytes) in &artifacts.entries {
            let buffer = pipeline.signature_buffer(name).unwrap();
            buffer.write(bytes).unwrap();
            buffer.mark_done().unwrap();
        }
        pipeline.emit(&signer_set, &[2], "1.0 (Android)").unwrap();
        assert!(!pipeline.is_pending());

        pipeline.remove_entry("classes.dex");
        assert!(pipeline.is_pending());
    }
}
