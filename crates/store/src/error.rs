//! Error types for the store.

use snafu::Snafu;
use stratus_types::codec::CodecError;

/// Result type alias for store operations.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

/// Errors that can occur during store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// A key read by the transaction was changed by a concurrent commit.
    ///
    /// Transient: re-running the same transaction body may succeed.
    #[snafu(display("Transaction conflict on table {table}"))]
    Conflict {
        /// Table holding the contended key.
        table: &'static str,
    },

    /// A unique insert found an existing record with the same key.
    #[snafu(display("Duplicate key in table {table}"))]
    DuplicateKey {
        /// Table that rejected the insert.
        table: &'static str,
    },

    /// A write targeted a partition that has not been ensured.
    #[snafu(display("Partition {partition:?} of table {table} does not exist"))]
    PartitionMissing {
        /// Partitioned table.
        table: &'static str,
        /// Missing partition selector.
        partition: String,
    },

    /// A key or value could not be encoded or decoded.
    #[snafu(display("Codec error in table {table}: {source}"))]
    Codec {
        /// Table being accessed.
        table: &'static str,
        /// Underlying codec error.
        source: CodecError,
    },
}

impl StoreError {
    /// Whether the failed transaction may succeed if retried unchanged.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
