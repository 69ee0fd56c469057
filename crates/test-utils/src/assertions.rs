//! Test assertion helpers.
//!
//! Provides polling-based assertions for async test scenarios.

use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Default polling interval for [`assert_eventually`].
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls a condition until it returns true or the timeout expires.
///
/// Use it for state that settles asynchronously, such as a waiter being
/// released by the correlation router after a reply, instead of fixed sleeps.
///
/// Returns `true` if the condition became true before the timeout.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use stratus_test_utils::assert_eventually;
///
/// # async fn example(router: std::sync::Arc<stratus_lambda::CorrelationRouter>) {
/// let drained = assert_eventually(Duration::from_secs(1), || router.pending() == 0).await;
/// assert!(drained, "router should release every waiter");
/// # }
/// ```
pub async fn assert_eventually<F>(timeout: Duration, condition: F) -> bool
where
    F: Fn() -> bool,
{
    let start = Instant::now();

    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        sleep(DEFAULT_POLL_INTERVAL).await;
    }

    condition()
}
