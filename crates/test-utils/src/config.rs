//! Test configuration helpers.
//!
//! Centralizes the short timeouts and small limits tests run with.

use std::time::Duration;

use stratus_types::config::{
    BrokerTopologyConfig, BundleConfig, EntrypointConfig, TransactionRetryConfig,
};

/// Entrypoint bounds suitable for tests.
///
/// - `default_execute_timeout`: 2s (a hung test fails fast)
/// - `max_execute_timeout`: 5s
#[must_use]
pub fn test_entrypoint_config() -> EntrypointConfig {
    EntrypointConfig {
        default_execute_timeout: Duration::from_secs(2),
        max_execute_timeout: Duration::from_secs(5),
    }
}

/// Broker topology for tests. Identical to the default topology.
#[must_use]
pub fn test_topology() -> BrokerTopologyConfig {
    BrokerTopologyConfig::default()
}

/// Transaction retry policy for tests. Identical to the default three retries.
#[must_use]
pub fn test_retry_config() -> TransactionRetryConfig {
    TransactionRetryConfig::default()
}

/// Bundle limits for tests: 64 KiB bundles, caller-supplied hashes trusted.
#[must_use]
pub fn test_bundle_config() -> BundleConfig {
    BundleConfig { max_bundle_bytes: 64 * 1024, ..BundleConfig::default() }
}
