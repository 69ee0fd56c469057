//! Request field limits.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

fn default_max_namespace_bytes() -> usize {
    63
}

fn default_max_uuid_bytes() -> usize {
    128
}

fn default_max_runtime_bytes() -> usize {
    64
}

fn default_max_bundle_hash_bytes() -> usize {
    128
}

fn default_max_payload_bytes() -> usize {
    4 * 1024 * 1024
}

/// Limits enforced on identifiers and payloads at the RPC boundary.
///
/// # Example
///
/// ```no_run
/// # use stratus_types::config::ValidationConfig;
/// let config = ValidationConfig::builder()
///     .max_uuid_bytes(64)
///     .build()
///     .expect("valid validation config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ValidationConfig {
    /// Maximum namespace length in bytes. Default: 63.
    #[serde(default = "default_max_namespace_bytes")]
    pub max_namespace_bytes: usize,
    /// Maximum lambda uuid length in bytes. Default: 128.
    #[serde(default = "default_max_uuid_bytes")]
    pub max_uuid_bytes: usize,
    /// Maximum runtime tag length in bytes. Default: 64.
    #[serde(default = "default_max_runtime_bytes")]
    pub max_runtime_bytes: usize,
    /// Maximum bundle hash length in bytes. Default: 128.
    #[serde(default = "default_max_bundle_hash_bytes")]
    pub max_bundle_hash_bytes: usize,
    /// Maximum invocation payload in bytes. Default: 4 MiB.
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_namespace_bytes: default_max_namespace_bytes(),
            max_uuid_bytes: default_max_uuid_bytes(),
            max_runtime_bytes: default_max_runtime_bytes(),
            max_bundle_hash_bytes: default_max_bundle_hash_bytes(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

#[bon::bon]
impl ValidationConfig {
    /// Creates a new validation configuration, verifying all limits are positive.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any limit is zero.
    #[builder]
    pub fn new(
        #[builder(default = default_max_namespace_bytes())] max_namespace_bytes: usize,
        #[builder(default = default_max_uuid_bytes())] max_uuid_bytes: usize,
        #[builder(default = default_max_runtime_bytes())] max_runtime_bytes: usize,
        #[builder(default = default_max_bundle_hash_bytes())] max_bundle_hash_bytes: usize,
        #[builder(default = default_max_payload_bytes())] max_payload_bytes: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self {
            max_namespace_bytes,
            max_uuid_bytes,
            max_runtime_bytes,
            max_bundle_hash_bytes,
            max_payload_bytes,
        };
        config.validate()?;
        Ok(config)
    }
}

impl ValidationConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any limit is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("max_namespace_bytes", self.max_namespace_bytes),
            ("max_uuid_bytes", self.max_uuid_bytes),
            ("max_runtime_bytes", self.max_runtime_bytes),
            ("max_bundle_hash_bytes", self.max_bundle_hash_bytes),
            ("max_payload_bytes", self.max_payload_bytes),
        ] {
            if value == 0 {
                return Err(ConfigError::Validation { message: format!("{name} must be >= 1") });
            }
        }
        Ok(())
    }
}
