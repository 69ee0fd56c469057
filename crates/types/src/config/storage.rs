//! Transaction retry configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Upper bound accepted for `max_retries`.
const MAX_RETRIES_CEILING: u32 = 16;

fn default_max_retries() -> u32 {
    3
}

/// Bounded retry policy for multi-key transactions.
///
/// A transaction body that fails with a transient conflict is re-run
/// unchanged up to `max_retries` additional times before the conflict is
/// surfaced as a storage error.
///
/// # Example
///
/// ```no_run
/// # use stratus_types::config::TransactionRetryConfig;
/// let config = TransactionRetryConfig::builder()
///     .max_retries(5)
///     .build()
///     .expect("valid retry config");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TransactionRetryConfig {
    /// Retries after the first attempt. Must be in `1..=16`. Default: 3.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

impl Default for TransactionRetryConfig {
    fn default() -> Self {
        Self { max_retries: default_max_retries() }
    }
}

#[bon::bon]
impl TransactionRetryConfig {
    /// Creates a new retry configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_retries` is out of range.
    #[builder]
    pub fn new(
        #[builder(default = default_max_retries())] max_retries: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_retries };
        config.validate()?;
        Ok(config)
    }
}

impl TransactionRetryConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_retries` is zero or above 16.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 || self.max_retries > MAX_RETRIES_CEILING {
            return Err(ConfigError::Validation {
                message: format!(
                    "max_retries must be in 1..={MAX_RETRIES_CEILING}, got {}",
                    self.max_retries
                ),
            });
        }
        Ok(())
    }

    /// Total attempts including the first one.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
