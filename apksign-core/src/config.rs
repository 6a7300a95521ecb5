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

//! Engine configuration, built with validation the way
//! [crate::signer_config::SignerConfig::from_combined_pem_string] validates
//! its own input.

use apksign_common::{ApkSignError, Result};

use crate::signer_config::SignerConfig;

pub struct EngineConfig {
    pub v1_enabled: bool,
    pub v2_enabled: bool,
    pub debuggable_permitted: bool,
    pub preserve_other_signers: bool,
    pub created_by: String,
    pub min_sdk_version: i32,
    pub signers: Vec<SignerConfig>
}

/// Builds an [EngineConfig], validating it can't produce an engine with an
/// empty signer list or no `created_by` string.
pub struct EngineConfigBuilder {
    v1_enabled: bool,
    v2_enabled: bool,
    debuggable_permitted: bool,
    preserve_other_signers: bool,
    created_by: String,
    min_sdk_version: i32,
    signers: Vec<SignerConfig>
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        EngineConfigBuilder {
            v1_enabled: true,
            v2_enabled: true,
            debuggable_permitted: true,
            preserve_other_signers: false,
            created_by: "1.0 (Android)".to_string(),
            min_sdk_version: 24,
            signers: Vec::new()
        }
    }
}

impl EngineConfigBuilder {
    pub fn new() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    pub fn v1_enabled(mut self, enabled: bool) -> Self {
        self.v1_enabled = enabled;
        self
    }

    pub fn v2_enabled(mut self, enabled: bool) -> Self {
        self.v2_enabled = enabled;
        self
    }

    pub fn debuggable_permitted(mut self, permitted: bool) -> Self {
        self.debuggable_permitted = permitted;
        self
    }

    pub fn preserve_other_signers(mut self, preserve: bool) -> Self {
        self.preserve_other_signers = preserve;
        self
    }

    pub fn created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    pub fn min_sdk_version(mut self, min_sdk_version: i32) -> Self {
        self.min_sdk_version = min_sdk_version;
        self
    }

    pub fn add_signer(mut self, signer: SignerConfig) -> Self {
        self.signers.push(signer);
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        if self.signers.is_empty() {
            return Err(ApkSignError::InvalidConfig("at least one signer is required".to_string()));
        }
        if self.created_by.trim().is_empty() {
            return Err(ApkSignError::InvalidConfig("created_by must not be empty".to_string()));
        }

        Ok(EngineConfig {
            v1_enabled: self.v1_enabled,
            v2_enabled: self.v2_enabled,
            debuggable_permitted: self.debuggable_permitted,
            preserve_other_signers: self.preserve_other_signers,
            created_by: self.created_by,
            min_sdk_version: self.min_sdk_version,
            signers: self.signers
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_interface() {
        let builder = EngineConfigBuilder::new();
        assert!(builder.v1_enabled);
        assert!(builder.v2_enabled);
        assert!(builder.debuggable_permitted);
        assert!(!builder.preserve_other_signers);
        assert_eq!(builder.created_by, "1.0 (Android)");
    }

    #[test]
    fn build_rejects_empty_signer_list() {
        let result = EngineConfigBuilder::new().build();
        assert!(matches!(result, Err(ApkSignError::InvalidConfig(_))));
    }

    #[test]
    fn build_rejects_blank_created_by() {
        let signer = SignerConfig::generate_for_testing("a").unwrap();
        let result = EngineConfigBuilder::new().add_signer(signer).created_by("   ").build();
        assert!(matches!(result, Err(ApkSignError::InvalidConfig(_))));
    }

    #[test]
    fn build_succeeds_with_a_signer_and_default_created_by() {
        let signer = SignerConfig::generate_for_testing("a").unwrap();
        let config = EngineConfigBuilder::new().add_signer(signer).build().unwrap();
        assert_eq!(config.signers.len(), 1);
    }
}
