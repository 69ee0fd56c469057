//! Shared test utilities for Stratus crates.
//!
//! - [`assert_eventually`] - Poll a condition until it's true or timeout
//! - [`FakeWorker`] - Scripted worker pool answering dispatched tasks
//! - [`test_entrypoint_config`] and friends - Short-timeout configurations for tests

#![deny(unsafe_code)]

mod assertions;
pub use assertions::assert_eventually;

mod config;
pub use config::{test_bundle_config, test_entrypoint_config, test_retry_config, test_topology};

mod fake_worker;
pub use fake_worker::FakeWorker;

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::Duration,
    };

    use super::*;

    #[tokio::test]
    async fn test_assert_eventually_immediate_success() {
        let result = assert_eventually(Duration::from_millis(100), || true).await;
        assert!(result);
    }

    #[tokio::test]
    async fn test_assert_eventually_times_out() {
        let result = assert_eventually(Duration::from_millis(50), || false).await;
        assert!(!result);
    }

    #[tokio::test]
    async fn test_assert_eventually_observes_async_change() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = Arc::clone(&flag);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            setter.store(true, Ordering::SeqCst);
        });

        let result =
            assert_eventually(Duration::from_secs(1), || flag.load(Ordering::SeqCst)).await;
        assert!(result);
    }

    #[tokio::test]
    async fn test_assert_eventually_polls_repeatedly() {
        let polls = AtomicUsize::new(0);
        let result = assert_eventually(Duration::from_secs(1), || {
            polls.fetch_add(1, Ordering::SeqCst) >= 3
        })
        .await;
        assert!(result);
        assert!(polls.load(Ordering::SeqCst) >= 4);
    }

    #[test]
    fn test_entrypoint_config_is_valid() {
        let config = test_entrypoint_config();
        config.validate().unwrap();
        assert!(config.default_execute_timeout <= config.max_execute_timeout);
    }
}
