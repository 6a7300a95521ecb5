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

//! A driver-agnostic APK signing engine: the driver owns ZIP I/O and feeds
//! entry bytes through the requests this crate hands back, and the engine
//! tracks what a v1 (JAR) and/or v2 (APK Signing Block) signature over that
//! content requires.
//!
//! [Engine] is the single entry point; everything else is exposed so a
//! driver can inspect what it got back (an [InspectionRequest] variant) or
//! wire up its own [ManifestInspector].

mod config;
mod debuggable;
mod engine;
mod entry_policy;
mod inspection;
mod signer_config;
mod signer_set;
mod v1_pipeline;
mod v2_pipeline;

pub use config::{EngineConfig, EngineConfigBuilder};
pub use debuggable::ManifestInspector;
pub use engine::Engine;
pub use entry_policy::EntryInstruction;
pub use inspection::{BufferRequest, DigestRequest, FanOutRequest, InspectionRequest};
pub use signer_config::SignerConfig;
pub use v1_pipeline::V1Artifacts;
pub use v2_pipeline::V2Artifact;

pub use apksign_common::{ApkSignError, DigestAlgorithm, Result};
