//! Broker topology configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

fn default_task_exchange() -> String {
    "lambda.tasks".to_string()
}

fn default_response_exchange() -> String {
    "lambda.responses".to_string()
}

/// Names of the two durable direct exchanges the subsystem uses.
///
/// Task envelopes are published to `task_exchange` with routing key = runtime.
/// Replies are published to `response_exchange` with routing key = the
/// entrypoint's private reply queue name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct BrokerTopologyConfig {
    /// Exchange receiving task envelopes.
    #[serde(default = "default_task_exchange")]
    pub task_exchange: String,
    /// Exchange receiving task results.
    #[serde(default = "default_response_exchange")]
    pub response_exchange: String,
}

impl Default for BrokerTopologyConfig {
    fn default() -> Self {
        Self {
            task_exchange: default_task_exchange(),
            response_exchange: default_response_exchange(),
        }
    }
}

#[bon::bon]
impl BrokerTopologyConfig {
    /// Creates a new topology configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a name is empty or both names are equal.
    #[builder]
    pub fn new(
        #[builder(default = default_task_exchange())] task_exchange: String,
        #[builder(default = default_response_exchange())] response_exchange: String,
    ) -> Result<Self, ConfigError> {
        let config = Self { task_exchange, response_exchange };
        config.validate()?;
        Ok(config)
    }
}

impl BrokerTopologyConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if a name is empty or both names are equal.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.task_exchange.is_empty() {
            return Err(ConfigError::Validation {
                message: "task_exchange must not be empty".to_string(),
            });
        }
        if self.response_exchange.is_empty() {
            return Err(ConfigError::Validation {
                message: "response_exchange must not be empty".to_string(),
            });
        }
        if self.task_exchange == self.response_exchange {
            return Err(ConfigError::Validation {
                message: "task_exchange and response_exchange must differ".to_string(),
            });
        }
        Ok(())
    }
}
