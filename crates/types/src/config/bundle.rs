//! Bundle upload policy.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Room left in a gRPC message for the fields around a bundle or payload.
pub const MESSAGE_HEADROOM_BYTES: usize = 64 * 1024;

fn default_max_bundle_bytes() -> usize {
    64 * 1024 * 1024
}

/// How the manager treats caller-supplied bundle hashes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HashPolicy {
    /// Accept the hash as given. Colliding uploads are served the first-written bytes.
    #[default]
    Trust,
    /// Require the hash to be the hex SHA-256 of the uploaded bytes.
    VerifySha256,
}

/// Bundle upload limits and hash policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BundleConfig {
    /// Hash verification policy. Default: `trust`.
    #[serde(default)]
    pub hash_policy: HashPolicy,
    /// Largest accepted bundle in bytes. Default: 64 MiB.
    #[serde(default = "default_max_bundle_bytes")]
    pub max_bundle_bytes: usize,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self { hash_policy: HashPolicy::default(), max_bundle_bytes: default_max_bundle_bytes() }
    }
}

#[bon::bon]
impl BundleConfig {
    /// Creates a new bundle configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_bundle_bytes` is zero.
    #[builder]
    pub fn new(
        #[builder(default)] hash_policy: HashPolicy,
        #[builder(default = default_max_bundle_bytes())] max_bundle_bytes: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { hash_policy, max_bundle_bytes };
        config.validate()?;
        Ok(config)
    }
}

impl BundleConfig {
    /// Largest gRPC message that carries a bundle of `max_bundle_bytes`.
    pub fn max_message_bytes(&self) -> usize {
        self.max_bundle_bytes.saturating_add(MESSAGE_HEADROOM_BYTES)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_bundle_bytes` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bundle_bytes == 0 {
            return Err(ConfigError::Validation {
                message: "max_bundle_bytes must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}
