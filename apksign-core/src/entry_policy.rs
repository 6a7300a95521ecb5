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

//! Pure classification of ZIP entry names into pass-through, drop, or
//! engine-owned, with no side effects on engine state.

use std::collections::HashSet;

/// What the driver should do with an entry the engine was asked about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryInstruction {
    /// Copy the entry through unchanged.
    PassThrough,
    /// Omit the entry entirely (a foreign signature file being replaced).
    Drop,
    /// The engine will itself emit an entry under this name; the driver
    /// must not copy an existing entry with the same name.
    EngineOwned
}

/// The set of `META-INF/` entry names this engine will emit itself, derived
/// once from a `SignerSet` at construction time.
pub struct EntryPolicy {
    engine_owned_names: HashSet<String>
}

impl EntryPolicy {
    pub fn new(engine_owned_names: impl IntoIterator<Item = String>) -> EntryPolicy {
        EntryPolicy { engine_owned_names: engine_owned_names.into_iter().collect() }
    }

    pub fn classify(&self, entry_name: &str) -> EntryInstruction {
        if self.engine_owned_names.contains(entry_name) {
            return EntryInstruction::EngineOwned;
        }
        if is_foreign_signature_artifact(entry_name) {
            return EntryInstruction::Drop;
        }
        EntryInstruction::PassThrough
    }
}

/// Whether `entry_name`'s content digest belongs in `MANIFEST.MF`. v1
/// coverage excludes everything under `META-INF/` (signature files are
/// engine-owned or foreign; neither carries its own digest line) and every
/// directory entry (no content to digest), matching apksig's
/// `isJarEntryDigestNeededInManifest`. This is independent of `classify`:
/// an entry can be `PassThrough` (the driver copies it unchanged) while
/// still being excluded from v1's digest set.
pub fn is_v1_covered(entry_name: &str) -> bool {
    !entry_name.starts_with("META-INF/") && !entry_name.ends_with('/')
}

/// Recognizes the JAR signature artifacts the engine always replaces:
/// `META-INF/MANIFEST.MF` (handled separately, as input manifest), per-signer
/// `.SF`/`.RSA`/`.DSA`/`.EC` files, and bare `META-INF/` directory entries.
fn is_foreign_signature_artifact(entry_name: &str) -> bool {
    let Some(rest) = entry_name.strip_prefix("META-INF/") else {
        return false;
    };
    if rest.is_empty() || rest.ends_with('/') {
        return true;
    }
    if rest.eq_ignore_ascii_case("MANIFEST.MF") {
        return true;
    }
    let upper = rest.to_ascii_uppercase();
    upper.ends_with(".SF") || upper.ends_with(".RSA") || upper.ends_with(".DSA") || upper.ends_with(".EC")
}
