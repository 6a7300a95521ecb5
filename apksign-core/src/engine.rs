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

//! Ties `EntryPolicy`, `SignerSet`, `V1Pipeline`, `V2Pipeline` and
//! `DebuggablePolicy` into the single stateful object a driver talks to.

use std::sync::Arc;

use apksign_common::{ApkSignError, Result};

use crate::config::EngineConfig;
use crate::debuggable::{DebuggablePolicy, ManifestInspector};
use crate::entry_policy::{is_v1_covered, EntryInstruction, EntryPolicy};
use crate::inspection::{BufferRequest, InspectionRequest};
use crate::signer_set::SignerSet;
use crate::v1_pipeline::{V1Artifacts, V1Pipeline};
use crate::v2_pipeline::{V2Artifact, V2Pipeline};

const ANDROID_MANIFEST: &str = "AndroidManifest.xml";

/// The `X-Android-APK-Signed` header lists the schemes applied ON TOP OF v1,
/// not v1 itself (reading this manifest already implies v1 applies).
fn applied_schemes(v2_enabled: bool) -> Vec<u8> {
    if v2_enabled {
        vec![2]
    } else {
        vec![]
    }
}

/// The stateful signing engine. One instance signs one APK; construct a new
/// one for the next.
pub struct Engine {
    v1_enabled: bool,
    v2_enabled: bool,
    created_by: String,
    preserve_other_signers: bool,
    entry_policy: EntryPolicy,
    signer_set: SignerSet,
    manifest_inspector: Box<dyn ManifestInspector>,
    v1: V1Pipeline,
    v2: V2Pipeline,
    debuggable: DebuggablePolicy,
    android_manifest_buffer: Option<Arc<BufferRequest>>,
    closed: bool
}

impl Engine {
    /// `manifest_inspector` is the driver's collaborator for reading the
    /// `android:debuggable` bit out of the output `AndroidManifest.xml`;
    /// this engine never parses binary XML itself.
    pub fn new(config: EngineConfig, manifest_inspector: Box<dyn ManifestInspector>) -> Result<Engine> {
        if config.preserve_other_signers {
            return Err(ApkSignError::Unsupported(
                "preserving foreign signers alongside this engine's own signature is not implemented".to_string()
            ));
        }
        if !config.v1_enabled && !config.v2_enabled {
            return Err(ApkSignError::InvalidConfig("at least one of v1_enabled/v2_enabled must be true".to_string()));
        }

        let signer_set = SignerSet::new(config.signers, config.min_sdk_version)?;
        let entry_policy = EntryPolicy::new(signer_set.v1_entry_names());

        Ok(Engine {
            v1_enabled: config.v1_enabled,
            v2_enabled: config.v2_enabled,
            created_by: config.created_by,
            preserve_other_signers: config.preserve_other_signers,
            entry_policy,
            signer_set,
            manifest_inspector,
            v1: V1Pipeline::new(),
            v2: V2Pipeline::new(),
            debuggable: DebuggablePolicy::new(config.debuggable_permitted),
            android_manifest_buffer: None,
            closed: false
        })
    }

    fn require_open(&self) -> Result<()> {
        if self.closed {
            return Err(ApkSignError::StateViolation("engine operation called after close()".to_string()));
        }
        Ok(())
    }

    /// Today this is only ever a no-op or `Unsupported`, since
    /// `preserve_other_signers` is rejected at construction.
    pub fn notify_input_signing_block(&self, _bytes: &[u8]) -> Result<()> {
        self.require_open()?;
        if self.preserve_other_signers {
            return Err(ApkSignError::Unsupported("preserve_other_signers".to_string()));
        }
        Ok(())
    }

    pub fn on_input_entry(&mut self, name: &str) -> Result<EntryInstruction> {
        self.require_open()?;
        let instruction = self.entry_policy.classify(name);
        if name.eq_ignore_ascii_case("META-INF/MANIFEST.MF") {
            self.v1.open_input_manifest_request();
        }
        Ok(instruction)
    }

    /// Fetches the handle opened by `on_input_entry` for `META-INF/MANIFEST.MF`,
    /// if the input JAR carries one; the driver streams the input manifest's
    /// bytes into it before calling `emit_v1`.
    pub fn input_manifest_buffer(&self) -> Option<&BufferRequest> {
        self.v1.input_manifest_request()
    }

    pub fn on_input_entry_removed(&mut self, name: &str) -> Result<EntryInstruction> {
        self.require_open()?;
        Ok(self.entry_policy.classify(name))
    }

    /// Consults the classification for `name`; for entries the engine needs
    /// to inspect (v1-covered content, engine-owned signature files, the
    /// output manifest) returns the request the driver must stream bytes
    /// into. Invalidates v2 unconditionally, since any output entry write
    /// changes the final ZIP layout.
    pub fn on_output_entry(&mut self, name: &str) -> Result<Option<InspectionRequest>> {
        self.require_open()?;
        self.v2.invalidate();

        let instruction = self.entry_policy.classify(name);
        match instruction {
            EntryInstruction::Drop => Ok(None),
            // The driver calls this again once it has the bytes `emit_v1`
            // handed back for this name, and writes them into the returned
            // buffer; that is how the engine confirms they arrived
            // unchanged (see `V1Pipeline::emit_manifest_stable`).
            EntryInstruction::EngineOwned => {
                let buffer = self.v1.open_signature_buffer(name);
                Ok(Some(InspectionRequest::Buffer(buffer)))
            }
            EntryInstruction::PassThrough if name.eq_ignore_ascii_case(ANDROID_MANIFEST) => {
                let buffer = Arc::new(BufferRequest::new());
                self.android_manifest_buffer = Some(buffer.clone());
                Ok(Some(InspectionRequest::Buffer(buffer)))
            }
            EntryInstruction::PassThrough => {
                if !self.v1_enabled || !is_v1_covered(name) {
                    return Ok(None);
                }
                let request = self.v1.open_digest_request(name, self.signer_set.content_digest_algorithm);
                Ok(Some(InspectionRequest::Digest(request)))
            }
        }
    }

    pub fn on_output_entry_removed(&mut self, name: &str) -> Result<()> {
        self.require_open()?;
        self.v2.invalidate();
        self.v1.remove_entry(name);
        if name.eq_ignore_ascii_case(ANDROID_MANIFEST) {
            self.android_manifest_buffer = None;
            self.debuggable.invalidate();
        }
        Ok(())
    }

    pub fn emit_v1(&mut self) -> Result<Option<V1Artifacts>> {
        self.require_open()?;
        if !self.v1_enabled {
            return Ok(None);
        }
        self.consolidate_android_manifest()?;
        self.debuggable.enforce()?;
        let schemes = applied_schemes(self.v2_enabled);
        self.v1.emit(&self.signer_set, &schemes, &self.created_by)
    }

    pub fn emit_v2(
        &mut self,
        entries_region: &[u8],
        central_directory: &[u8],
        eocd: &[u8],
        supports_padding: bool
    ) -> Result<Option<V2Artifact>> {
        self.require_open()?;
        if !self.v2_enabled {
            return Ok(None);
        }
        if self.v1_enabled && self.v1.is_pending() {
            return Err(ApkSignError::StateViolation(
                "emit_v2 called while v1 signing is still pending".to_string()
            ));
        }
        self.consolidate_android_manifest()?;
        self.debuggable.enforce()?;
        self.v2
            .emit(&self.signer_set, entries_region, central_directory, eocd, supports_padding)
            .map(Some)
    }

    /// Verifies v1 and v2, whichever are enabled, have been fully satisfied.
    pub fn commit(&mut self) -> Result<()> {
        self.require_open()?;
        if self.v1_enabled {
            self.v1.verify_finalized()?;
        }
        if self.v2_enabled && self.v2.is_pending() {
            return Err(ApkSignError::StateViolation("commit called before v2 signing was emitted".to_string()));
        }
        Ok(())
    }

    /// Releases all cached state. Any further call fails with
    /// `StateViolation`.
    pub fn close(&mut self) {
        self.closed = true;
        self.android_manifest_buffer = None;
    }

    fn consolidate_android_manifest(&mut self) -> Result<()> {
        let Some(buffer) = self.android_manifest_buffer.take() else {
            return Ok(());
        };
        if !buffer.is_done() {
            self.android_manifest_buffer = Some(buffer);
            return Err(ApkSignError::StateViolation(
                "the output AndroidManifest.xml buffer request has not been marked done".to_string()
            ));
        }
        let bytes = buffer.take_bytes()?;
        self.debuggable.observe_manifest(&bytes, self.manifest_inspector.as_ref())?;
        if self.v1_enabled {
            let digest = self.signer_set.content_digest_algorithm.digest(&bytes);
            self.v1.set_output_digest(ANDROID_MANIFEST, digest);
        }
        Ok(())
    }
}
