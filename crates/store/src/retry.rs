//! Bounded retry of transactions that fail with transient conflicts.
//!
//! Every mutating multi-key operation runs its transaction body through
//! [`retry_transaction`] so the retry policy is uniform and testable on its
//! own, for instance against a [`Database`](crate::Database) with
//! [`inject_conflicts`](crate::Database::inject_conflicts).

use std::{
    fmt::Display,
    future::Future,
    sync::atomic::{AtomicU32, Ordering},
    time::Duration,
};

use backon::{ExponentialBuilder, Retryable};

/// Shortest pause before re-running a conflicted transaction.
const MIN_RETRY_DELAY: Duration = Duration::from_millis(1);

/// Longest pause before re-running a conflicted transaction.
const MAX_RETRY_DELAY: Duration = Duration::from_millis(20);

/// Runs `body` until it succeeds, fails with a non-transient error, or has
/// been retried `max_retries` times.
///
/// `body` receives the zero-based attempt number and must re-run the whole
/// transaction (open, read, write, commit) each time. Retries are separated
/// by a short jittered backoff so contending writers spread out.
///
/// # Errors
///
/// Returns the first error `is_transient` rejects, or the last transient
/// error once retries are exhausted.
///
/// # Example
///
/// ```no_run
/// use stratus_store::{Database, StoreError, retry_transaction, tables::BundleRefs};
/// use stratus_types::BundleHash;
///
/// # async fn run(db: &Database) -> Result<(), StoreError> {
/// let hash = BundleHash::new("h1");
/// retry_transaction(3, StoreError::is_transient, |_attempt| {
///     let result = (|| {
///         let mut txn = db.write();
///         let count = txn.get::<BundleRefs>(&hash)?.unwrap_or(0);
///         txn.insert::<BundleRefs>(&hash, &(count + 1))?;
///         txn.commit()
///     })();
///     std::future::ready(result)
/// })
/// .await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry_transaction<T, E, F, Fut, P>(
    max_retries: u32,
    is_transient: P,
    mut body: F,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
    E: Display,
{
    let backoff = ExponentialBuilder::new()
        .with_min_delay(MIN_RETRY_DELAY)
        .with_max_delay(MAX_RETRY_DELAY)
        .with_jitter()
        .with_max_times(max_retries as usize);

    let attempts = AtomicU32::new(0);

    let result = (|| body(attempts.fetch_add(1, Ordering::SeqCst)))
        .retry(backoff)
        .sleep(tokio::time::sleep)
        .when(|e: &E| is_transient(e))
        .notify(|err: &E, delay: Duration| {
            tracing::debug!(
                attempt = attempts.load(Ordering::SeqCst),
                backoff_ms = millis_saturating(delay),
                error = %err,
                "Transaction conflicted, retrying"
            );
        })
        .await;

    if let Err(err) = &result
        && is_transient(err)
    {
        tracing::warn!(
            attempts = attempts.load(Ordering::SeqCst),
            error = %err,
            "Transaction retries exhausted"
        );
    }
    result
}

fn millis_saturating(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use stratus_types::BundleHash;

    use super::*;
    use crate::{Database, StoreError, tables::BundleRefs};

    fn increment(db: &Database, hash: &BundleHash) -> Result<u64, StoreError> {
        let mut txn = db.write();
        let count = txn.get::<BundleRefs>(hash)?.unwrap_or(0) + 1;
        txn.insert::<BundleRefs>(hash, &count)?;
        txn.commit()?;
        Ok(count)
    }

    #[tokio::test]
    async fn test_succeeds_first_try_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<&str, StoreError> = retry_transaction(3, StoreError::is_transient, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Ok("done"))
        })
        .await;
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_injected_conflicts_then_commits() {
        let db = Database::open_in_memory();
        let hash = BundleHash::new("h1");
        db.inject_conflicts(3);

        let seen = parking_lot::Mutex::new(Vec::new());
        let count = retry_transaction(3, StoreError::is_transient, |attempt| {
            seen.lock().push(attempt);
            std::future::ready(increment(&db, &hash))
        })
        .await
        .unwrap();

        assert_eq!(count, 1);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
        assert_eq!(db.read().get::<BundleRefs>(&hash).unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_surfaces_conflict_after_exhausting_retries() {
        let db = Database::open_in_memory();
        let hash = BundleHash::new("h1");
        db.inject_conflicts(4);

        let calls = AtomicU32::new(0);
        let err = retry_transaction(3, StoreError::is_transient, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(increment(&db, &hash))
        })
        .await
        .unwrap_err();

        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(db.read().get::<BundleRefs>(&hash).unwrap(), None);
    }

    #[test]
    fn test_backoff_millis_saturate_instead_of_truncating() {
        assert_eq!(millis_saturating(Duration::from_millis(20)), 20);
        assert_eq!(millis_saturating(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_non_transient_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let err = retry_transaction(3, StoreError::is_transient, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::ready(Err::<(), _>(StoreError::DuplicateKey { table: "lambda_directory" }))
        })
        .await
        .unwrap_err();

        assert!(matches!(err, StoreError::DuplicateKey { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
