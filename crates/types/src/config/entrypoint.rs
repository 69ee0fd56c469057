//! Entrypoint execution timeouts.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

fn default_execute_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_max_execute_timeout() -> Duration {
    Duration::from_secs(300)
}

/// Bounds applied to synchronous `Execute` calls.
///
/// A request carrying `timeout_millis == 0` waits `default_execute_timeout`.
/// Requests asking for more than `max_execute_timeout` are clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntrypointConfig {
    /// Wait used when the caller does not specify one.
    #[serde(default = "default_execute_timeout")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub default_execute_timeout: Duration,
    /// Longest wait any caller may request.
    #[serde(default = "default_max_execute_timeout")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub max_execute_timeout: Duration,
}

impl Default for EntrypointConfig {
    fn default() -> Self {
        Self {
            default_execute_timeout: default_execute_timeout(),
            max_execute_timeout: default_max_execute_timeout(),
        }
    }
}

#[bon::bon]
impl EntrypointConfig {
    /// Creates a new entrypoint configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a timeout is zero or the default
    /// exceeds the maximum.
    #[builder]
    pub fn new(
        #[builder(default = default_execute_timeout())] default_execute_timeout: Duration,
        #[builder(default = default_max_execute_timeout())] max_execute_timeout: Duration,
    ) -> Result<Self, ConfigError> {
        let config = Self { default_execute_timeout, max_execute_timeout };
        config.validate()?;
        Ok(config)
    }
}

impl EntrypointConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a timeout is zero or the default
    /// exceeds the maximum.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_execute_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "default_execute_timeout must be > 0".to_string(),
            });
        }
        if self.max_execute_timeout.is_zero() {
            return Err(ConfigError::Validation {
                message: "max_execute_timeout must be > 0".to_string(),
            });
        }
        if self.default_execute_timeout > self.max_execute_timeout {
            return Err(ConfigError::Validation {
                message: "default_execute_timeout must not exceed max_execute_timeout".to_string(),
            });
        }
        Ok(())
    }

    /// Resolves the wait for a request's `timeout_millis`.
    #[must_use]
    pub fn effective_timeout(&self, timeout_millis: u64) -> Duration {
        if timeout_millis == 0 {
            return self.default_execute_timeout;
        }
        Duration::from_millis(timeout_millis).min(self.max_execute_timeout)
    }
}
