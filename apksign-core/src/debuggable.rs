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

//! Caches the `android:debuggable` bit of the output `AndroidManifest.xml`
//! and enforces the policy that forbids signing debuggable APKs.
//!
//! Binary-XML parsing is out of scope for this engine; the driver supplies
//! a [ManifestInspector] that turns raw manifest bytes into the bit this
//! policy needs.

use apksign_common::{ApkSignError, Result};

/// Parses the debuggable bit out of an `AndroidManifest.xml` buffer. The
/// driver owns the actual binary-XML decoding; the engine only consumes the
/// resulting bool.
pub trait ManifestInspector {
    fn is_debuggable(&self, android_manifest_bytes: &[u8]) -> Result<bool>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DebuggableState {
    Unknown,
    Known(bool)
}

pub struct DebuggablePolicy {
    permitted: bool,
    state: DebuggableState
}

impl DebuggablePolicy {
    pub fn new(debuggable_permitted: bool) -> DebuggablePolicy {
        DebuggablePolicy { permitted: debuggable_permitted, state: DebuggableState::Unknown }
    }

    /// Called when the driver observes (new or replacement) bytes for the
    /// output `AndroidManifest.xml`; invalidates any cached bit.
    pub fn observe_manifest(&mut self, bytes: &[u8], inspector: &dyn ManifestInspector) -> Result<()> {
        let debuggable = inspector.is_debuggable(bytes).map_err(|_| {
            ApkSignError::Format("output AndroidManifest.xml could not be parsed for its debuggable bit".to_string())
        })?;
        self.state = DebuggableState::Known(debuggable);
        Ok(())
    }

    /// Called when the output `AndroidManifest.xml` entry is removed;
    /// returns to `Unknown` so the next signing attempt must observe it
    /// again (or fail, if permitted is false).
    pub fn invalidate(&mut self) {
        self.state = DebuggableState::Unknown;
    }

    /// Checked at v1- and v2-generation points. Fails with `StateViolation`
    /// if the manifest hasn't been observed yet and debuggable APKs are
    /// forbidden; fails with `SignatureRefusedDebuggable` if it has and the
    /// APK is debuggable.
    pub fn enforce(&self) -> Result<()> {
        if self.permitted {
            return Ok(());
        }
        match self.state {
            DebuggableState::Unknown => Err(ApkSignError::StateViolation(
                "debuggable APKs are forbidden but the output AndroidManifest.xml has not been observed yet".to_string()
            )),
            DebuggableState::Known(true) => Err(ApkSignError::SignatureRefusedDebuggable),
            DebuggableState::Known(false) => Ok(())
        }
    }
}
