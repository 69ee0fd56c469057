//! stratus-store: an embedded transactional key/value store for lambda metadata.
//!
//! The store keeps a small fixed set of typed tables. Some tables are global
//! (bundles), others are partitioned by an explicit shard selector carried in
//! the key (the lambda directory, partitioned by namespace).
//!
//! - **Optimistic transactions**: write transactions record the version of
//!   every key they read and validate it at commit. A concurrent writer that
//!   changed one of those keys causes [`StoreError::Conflict`], which is
//!   transient and safe to retry unchanged.
//! - **Explicit partitions**: a partition must be ensured (idempotently,
//!   outside any transaction) before a transaction may write into it.
//! - **Fault injection**: [`Database::inject_conflicts`] forces the next
//!   commits to conflict so retry policies are testable in isolation.
//!
//! ## Quick Start
//!
//! ```no_run
//! use stratus_store::{Database, tables::BundleRefs};
//! use stratus_types::BundleHash;
//!
//! let db = Database::open_in_memory();
//!
//! let mut txn = db.write();
//! txn.insert::<BundleRefs>(&BundleHash::new("h1"), &1)?;
//! txn.commit()?;
//!
//! let count = db.read().get::<BundleRefs>(&BundleHash::new("h1"))?;
//! assert_eq!(count, Some(1));
//! # Ok::<(), stratus_store::StoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod db;
pub mod error;
pub mod retry;
pub mod tables;
pub mod transaction;

pub use db::{Database, DatabaseStats};
pub use error::{Result, StoreError};
pub use retry::retry_transaction;
pub use tables::{Table, TableId};
pub use transaction::{ReadTransaction, WriteTransaction};
