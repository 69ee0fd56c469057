//! Observability metrics exposed via the `metrics` facade.
//!
//! ## Metric Naming Conventions
//!
//! All metrics follow the pattern: `stratus_lambda_{subsystem}_{name}_{unit}`
//!
//! - Counters: `_total` suffix
//! - Histograms: `_seconds` suffix
//! - Gauges: no suffix

use std::time::Instant;

use metrics::{counter, gauge, histogram};

// =============================================================================
// Metric Names (constants for consistency)
// =============================================================================

// Manager metrics
const CREATES_TOTAL: &str = "stratus_lambda_manager_creates_total";
const DELETES_TOTAL: &str = "stratus_lambda_manager_deletes_total";
const TRANSACTION_RETRIES_TOTAL: &str = "stratus_lambda_manager_transaction_retries_total";

// Entrypoint metrics
const CALLS_TOTAL: &str = "stratus_lambda_entrypoint_calls_total";
const EXECUTES_TOTAL: &str = "stratus_lambda_entrypoint_executes_total";
/// Name of the `Execute` latency histogram.
pub const EXECUTE_LATENCY: &str = "stratus_lambda_entrypoint_execute_latency_seconds";

// Correlation router metrics
const PENDING_WAITERS: &str = "stratus_lambda_router_pending_waiters";
const ROUTER_DELIVERIES_TOTAL: &str = "stratus_lambda_router_deliveries_total";

// =============================================================================
// Manager Metrics
// =============================================================================

/// Records a create by outcome.
#[inline]
pub fn record_create(status: &'static str) {
    counter!(CREATES_TOTAL, "status" => status).increment(1);
}

/// Records a delete by outcome.
#[inline]
pub fn record_delete(status: &'static str) {
    counter!(DELETES_TOTAL, "status" => status).increment(1);
}

/// Records a transaction re-run after a transient conflict.
#[inline]
pub fn record_transaction_retry(operation: &'static str) {
    counter!(TRANSACTION_RETRIES_TOTAL, "operation" => operation).increment(1);
}

// =============================================================================
// Entrypoint Metrics
// =============================================================================

/// Records a fire-and-forget call.
#[inline]
pub fn record_call(success: bool) {
    let status = if success { "success" } else { "error" };
    counter!(CALLS_TOTAL, "status" => status).increment(1);
}

/// Records a synchronous execution and how long the caller waited.
#[inline]
pub fn record_execute(status: &'static str, latency_secs: f64) {
    counter!(EXECUTES_TOTAL, "status" => status).increment(1);
    histogram!(EXECUTE_LATENCY, "status" => status).record(latency_secs);
}

// =============================================================================
// Correlation Router Metrics
// =============================================================================

/// Sets the number of callers waiting for a reply.
#[inline]
pub fn set_pending_waiters(count: usize) {
    gauge!(PENDING_WAITERS).set(count as f64);
}

/// Records a reply handed to its waiter.
#[inline]
pub fn record_reply_routed() {
    counter!(ROUTER_DELIVERIES_TOTAL, "outcome" => "routed").increment(1);
}

/// Records a reply dropped by the router (`unclaimed` or `malformed`).
#[inline]
pub fn record_reply_dropped(reason: &'static str) {
    counter!(ROUTER_DELIVERIES_TOTAL, "outcome" => reason).increment(1);
}

/// Histogram bucket boundaries for `Execute` latency (in seconds).
///
/// Execute latency is dominated by worker run time and spans milliseconds
/// up to the maximum execute timeout.
pub const EXECUTE_LATENCY_BUCKETS: [f64; 12] =
    [0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0, 30.0, 120.0, 300.0];

// =============================================================================
// Timer Helper
// =============================================================================

/// Measures elapsed time from creation.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Starts a timer.
    pub fn start() -> Self {
        Self { start: Instant::now() }
    }

    /// Returns elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_recorders_without_exporter() {
        // The facade is a no-op until an exporter is installed.
        record_create("success");
        record_delete("error");
        record_transaction_retry("create");
        record_call(true);
        record_execute("deadline_exceeded", 0.5);
        set_pending_waiters(3);
        record_reply_routed();
        record_reply_dropped("unclaimed");
    }

    #[test]
    fn test_execute_buckets_ascending() {
        for window in EXECUTE_LATENCY_BUCKETS.windows(2) {
            assert!(window[0] < window[1]);
        }
    }

    #[test]
    fn test_timer_elapsed() {
        let timer = Timer::start();
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert!(timer.elapsed_secs() >= 0.01);
    }
}
