//! Error plumbing between the store, the broker and [`LambdaError`].

use snafu::Snafu;
use stratus_broker::BrokerError;
use stratus_store::StoreError;
use stratus_types::{LambdaError, error::BrokerSnafu, error::StorageSnafu};

/// Failure of one attempt of a transactional body.
///
/// Keeps the store error intact so the retry predicate can tell transient
/// conflicts apart from domain rejections such as a duplicate lambda.
#[derive(Debug, Snafu)]
pub(crate) enum TransactionError {
    #[snafu(display("{source}"))]
    Store { source: StoreError },

    #[snafu(display("{source}"))]
    Rejected { source: LambdaError },
}

impl TransactionError {
    pub(crate) fn is_transient(&self) -> bool {
        matches!(self, Self::Store { source } if source.is_transient())
    }
}

impl From<StoreError> for TransactionError {
    fn from(source: StoreError) -> Self {
        Self::Store { source }
    }
}

impl From<LambdaError> for TransactionError {
    fn from(source: LambdaError) -> Self {
        Self::Rejected { source }
    }
}

impl From<TransactionError> for LambdaError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::Store { source } => storage_error(&source),
            TransactionError::Rejected { source } => source,
        }
    }
}

pub(crate) type TxnResult<T> = std::result::Result<T, TransactionError>;

#[track_caller]
pub(crate) fn storage_error(err: &StoreError) -> LambdaError {
    StorageSnafu { message: err.to_string() }.build()
}

#[track_caller]
pub(crate) fn broker_error(err: &BrokerError) -> LambdaError {
    BrokerSnafu { message: err.to_string() }.build()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use stratus_types::ErrorCode;

    use super::*;

    #[test]
    fn test_only_store_conflicts_are_transient() {
        let conflict = TransactionError::from(StoreError::Conflict { table: "bundle_refs" });
        assert!(conflict.is_transient());

        let duplicate = TransactionError::from(StoreError::DuplicateKey { table: "bundle_refs" });
        assert!(!duplicate.is_transient());

        let rejected = TransactionError::from(LambdaError::InvalidArgument {
            message: "nope".to_string(),
        });
        assert!(!rejected.is_transient());
    }

    #[test]
    fn test_exhausted_conflict_surfaces_as_storage() {
        let err: LambdaError =
            TransactionError::from(StoreError::Conflict { table: "bundle_refs" }).into();
        assert_eq!(err.code(), ErrorCode::Storage);
        assert!(err.to_string().contains("bundle_refs"));
    }

    #[test]
    fn test_rejection_passes_through() {
        let err: LambdaError = TransactionError::from(LambdaError::bundle_not_found("h1")).into();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }
}
