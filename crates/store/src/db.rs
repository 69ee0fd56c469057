//! Database handle and commit protocol.
//!
//! # Example
//!
//! ```no_run
//! use stratus_store::{Database, TableId, tables::{LambdaDirectory, LambdaKey}};
//! use stratus_types::{Lambda, LambdaUuid, Namespace};
//!
//! let db = Database::open_in_memory();
//! let namespace = Namespace::new("acme");
//!
//! // Partitions are created outside transactions, idempotently.
//! db.ensure_partition(TableId::LambdaDirectory, namespace.as_str());
//!
//! let key = LambdaKey::new(&namespace, &LambdaUuid::new("resize"));
//! let txn = db.read();
//! let lambda: Option<Lambda> = txn.get::<LambdaDirectory>(&key)?;
//! # Ok::<(), stratus_store::StoreError>(())
//! ```

use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc,
        atomic::{AtomicU32, AtomicU64, Ordering},
    },
};

use arc_swap::ArcSwap;
use parking_lot::{Mutex, RwLock};

use crate::{
    error::{Result, StoreError},
    tables::TableId,
    transaction::{ReadTransaction, WriteTransaction},
};

/// Encoded record address: table plus postcard-encoded key.
pub(crate) type RecordKey = (TableId, Vec<u8>);

/// A committed record and the commit version that last wrote it.
#[derive(Debug, Clone)]
pub(crate) struct Entry {
    pub(crate) version: u64,
    pub(crate) value: Vec<u8>,
}

/// Staged change of a write transaction. `None` deletes the record.
pub(crate) type StagedWrite = Option<Vec<u8>>;

/// Point-in-time counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Successful commits.
    pub commits: u64,
    /// Commits rejected with a transient conflict (injected ones included).
    pub conflicts: u64,
    /// Records currently stored across all tables.
    pub records: usize,
}

/// The main database handle.
///
/// Thread-safe with interior mutability; share it behind an `Arc`.
///
/// # Concurrency
///
/// Any number of write transactions may be open at once. Each one records the
/// version of every key it reads. Commit takes the record lock exclusively,
/// checks that none of those versions moved, and only then applies the staged
/// writes under a fresh version. A moved version fails the commit with
/// [`StoreError::Conflict`] and applies nothing.
pub struct Database {
    /// Committed records.
    records: RwLock<HashMap<RecordKey, Entry>>,
    /// Ensured `(table, partition)` pairs. Copy-on-write; partitions are only
    /// ever added.
    partitions: ArcSwap<HashSet<(TableId, String)>>,
    /// Serializes partition creation.
    partition_lock: Mutex<()>,
    /// Last committed version. Advanced only while `records` is write-locked.
    version: AtomicU64,
    /// Commits still to be failed with an injected conflict.
    injected_conflicts: AtomicU32,
    commits: AtomicU64,
    conflicts: AtomicU64,
}

impl Database {
    /// Creates a new, empty in-memory database.
    pub fn open_in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            partitions: ArcSwap::from_pointee(HashSet::new()),
            partition_lock: Mutex::new(()),
            version: AtomicU64::new(0),
            injected_conflicts: AtomicU32::new(0),
            commits: AtomicU64::new(0),
            conflicts: AtomicU64::new(0),
        }
    }

    /// Begins a read transaction (read-committed point reads).
    pub fn read(&self) -> ReadTransaction<'_> {
        ReadTransaction::new(self)
    }

    /// Begins an optimistic write transaction.
    ///
    /// Nothing is locked until [`WriteTransaction::commit`].
    pub fn write(&self) -> WriteTransaction<'_> {
        WriteTransaction::new(self)
    }

    /// Ensures a partition of a partitioned table exists.
    ///
    /// Idempotent. Returns `true` if this call created the partition. Calling
    /// it for a global table is a no-op returning `false`.
    pub fn ensure_partition(&self, table: TableId, partition: &str) -> bool {
        if !table.is_partitioned() || self.has_partition(table, partition) {
            return false;
        }

        let _guard = self.partition_lock.lock();
        let current = self.partitions.load_full();
        let key = (table, partition.to_owned());
        if current.contains(&key) {
            return false;
        }
        let mut next = HashSet::clone(&current);
        next.insert(key);
        self.partitions.store(Arc::new(next));
        tracing::debug!(table = table.name(), partition, "Partition created");
        true
    }

    /// Whether `partition` of `table` has been ensured.
    ///
    /// Global tables always report `true`.
    pub fn has_partition(&self, table: TableId, partition: &str) -> bool {
        if !table.is_partitioned() {
            return true;
        }
        self.partitions.load().iter().any(|(t, p)| *t == table && p == partition)
    }

    /// Makes the next `count` commits fail with a transient conflict.
    ///
    /// Injected conflicts are consumed before read-set validation, so the
    /// failed commit applies nothing.
    pub fn inject_conflicts(&self, count: u32) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Returns database statistics.
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            commits: self.commits.load(Ordering::Relaxed),
            conflicts: self.conflicts.load(Ordering::Relaxed),
            records: self.records.read().len(),
        }
    }

    pub(crate) fn lookup(&self, key: &RecordKey) -> Option<Entry> {
        self.records.read().get(key).cloned()
    }

    pub(crate) fn count(&self, table: TableId) -> usize {
        self.records.read().keys().filter(|(t, _)| *t == table).count()
    }

    /// Validates the read set and applies the staged writes atomically.
    pub(crate) fn apply(
        &self,
        reads: &HashMap<RecordKey, u64>,
        writes: HashMap<RecordKey, StagedWrite>,
    ) -> Result<u64> {
        if self.take_injected_conflict() {
            let table = writes.keys().chain(reads.keys()).map(|(t, _)| t.name()).next();
            return Err(self.conflict(table.unwrap_or("unknown")));
        }

        let mut records = self.records.write();
        for (key, seen) in reads {
            let current = records.get(key).map_or(0, |entry| entry.version);
            if current != *seen {
                return Err(self.conflict(key.0.name()));
            }
        }

        let version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        for (key, staged) in writes {
            match staged {
                Some(value) => {
                    records.insert(key, Entry { version, value });
                }
                None => {
                    records.remove(&key);
                }
            }
        }
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(version)
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn conflict(&self, table: &'static str) -> StoreError {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(table, "Commit rejected: read set changed");
        StoreError::Conflict { table }
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::open_in_memory()
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("version", &self.version.load(Ordering::Relaxed))
            .field("partitions", &self.partitions.load().len())
            .finish_non_exhaustive()
    }
}
