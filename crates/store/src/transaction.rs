//! Read and write transactions.

use std::collections::{HashMap, hash_map::Entry as MapEntry};

use snafu::ResultExt;
use stratus_types::codec;

use crate::{
    db::{Database, RecordKey, StagedWrite},
    error::{CodecSnafu, Result, StoreError},
    tables::Table,
};

fn record_key<T: Table>(key: &T::Key) -> Result<RecordKey> {
    let bytes = codec::encode(key).context(CodecSnafu { table: T::ID.name() })?;
    Ok((T::ID, bytes))
}

fn decode_value<T: Table>(bytes: &[u8]) -> Result<T::Value> {
    codec::decode(bytes).context(CodecSnafu { table: T::ID.name() })
}

// ============================================================================
// ReadTransaction
// ============================================================================

/// Read-only access with read-committed point reads.
///
/// Used for lookups that need no transactional guarantees, such as existence
/// checks and projections taken before a write transaction starts.
pub struct ReadTransaction<'db> {
    db: &'db Database,
}

impl<'db> ReadTransaction<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db }
    }

    /// Returns the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Codec`] if the key or stored value fails to encode or decode.
    pub fn get<T: Table>(&self, key: &T::Key) -> Result<Option<T::Value>> {
        let key = record_key::<T>(key)?;
        match self.db.lookup(&key) {
            Some(entry) => Ok(Some(decode_value::<T>(&entry.value)?)),
            None => Ok(None),
        }
    }

    /// Whether a record exists under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Codec`] if the key fails to encode.
    pub fn contains<T: Table>(&self, key: &T::Key) -> Result<bool> {
        let key = record_key::<T>(key)?;
        Ok(self.db.lookup(&key).is_some())
    }

    /// Number of records in table `T`.
    pub fn len<T: Table>(&self) -> usize {
        self.db.count(T::ID)
    }

    /// Whether table `T` holds no records.
    pub fn is_empty<T: Table>(&self) -> bool {
        self.len::<T>() == 0
    }
}

// ============================================================================
// WriteTransaction
// ============================================================================

/// Optimistic multi-key write transaction.
///
/// Reads go to the transaction's own staged writes first, then to committed
/// state; every committed read pins the version it saw. Writes are buffered
/// and invisible to others until [`commit`](Self::commit) validates the
/// pinned versions.
///
/// **Drop behavior:** dropping without committing discards all staged
/// writes. The database state is unchanged.
pub struct WriteTransaction<'db> {
    db: &'db Database,
    /// Versions observed by committed-state reads (0 = absent).
    reads: HashMap<RecordKey, u64>,
    /// Buffered writes, keyed by record.
    writes: HashMap<RecordKey, StagedWrite>,
}

impl<'db> WriteTransaction<'db> {
    pub(crate) fn new(db: &'db Database) -> Self {
        Self { db, reads: HashMap::new(), writes: HashMap::new() }
    }

    /// Returns the value under `key` as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if the key changed since this
    /// transaction first read it, or [`StoreError::Codec`] on encoding failure.
    pub fn get<T: Table>(&mut self, key: &T::Key) -> Result<Option<T::Value>> {
        let key = record_key::<T>(key)?;
        match self.read_bytes(key)? {
            Some(bytes) => Ok(Some(decode_value::<T>(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Whether a record exists under `key`, as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn contains<T: Table>(&mut self, key: &T::Key) -> Result<bool> {
        let key = record_key::<T>(key)?;
        Ok(self.read_bytes(key)?.is_some())
    }

    /// Inserts or overwrites the record under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PartitionMissing`] if `key` targets a partition
    /// that has not been ensured, or [`StoreError::Codec`] on encoding failure.
    pub fn insert<T: Table>(&mut self, key: &T::Key, value: &T::Value) -> Result<()> {
        self.check_partition::<T>(key)?;
        let record = record_key::<T>(key)?;
        let bytes = codec::encode(value).context(CodecSnafu { table: T::ID.name() })?;
        self.writes.insert(record, Some(bytes));
        Ok(())
    }

    /// Inserts a record that must not already exist.
    ///
    /// The existence check joins the read set, so a concurrent insert of the
    /// same key surfaces as a conflict at commit rather than a lost update.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DuplicateKey`] if a record exists under `key`,
    /// plus the errors of [`insert`](Self::insert).
    pub fn insert_unique<T: Table>(&mut self, key: &T::Key, value: &T::Value) -> Result<()> {
        self.check_partition::<T>(key)?;
        if self.contains::<T>(key)? {
            return Err(StoreError::DuplicateKey { table: T::ID.name() });
        }
        self.insert::<T>(key, value)
    }

    /// Deletes the record under `key`.
    ///
    /// Returns whether a record existed, as seen by this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] or [`StoreError::Codec`] as for [`get`](Self::get).
    pub fn delete<T: Table>(&mut self, key: &T::Key) -> Result<bool> {
        let record = record_key::<T>(key)?;
        let existed = self.read_bytes(record.clone())?.is_some();
        if existed {
            self.writes.insert(record, None);
        }
        Ok(existed)
    }

    /// Validates the read set and makes all staged writes visible atomically.
    ///
    /// Returns the commit version.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Conflict`] if any key read by this transaction
    /// was changed by another commit. Nothing is applied in that case.
    pub fn commit(self) -> Result<u64> {
        let Self { db, reads, writes } = self;
        db.apply(&reads, writes)
    }

    /// Discards all staged writes.
    pub fn abort(self) {}

    fn check_partition<T: Table>(&self, key: &T::Key) -> Result<()> {
        if let Some(partition) = T::partition(key)
            && !self.db.has_partition(T::ID, partition)
        {
            return Err(StoreError::PartitionMissing {
                table: T::ID.name(),
                partition: partition.to_owned(),
            });
        }
        Ok(())
    }

    fn read_bytes(&mut self, key: RecordKey) -> Result<Option<Vec<u8>>> {
        if let Some(staged) = self.writes.get(&key) {
            return Ok(staged.clone());
        }

        let entry = self.db.lookup(&key);
        let version = entry.as_ref().map_or(0, |e| e.version);
        let table = key.0.name();
        match self.reads.entry(key) {
            MapEntry::Occupied(seen) if *seen.get() != version => {
                return Err(StoreError::Conflict { table });
            }
            MapEntry::Occupied(_) => {}
            MapEntry::Vacant(slot) => {
                slot.insert(version);
            }
        }
        Ok(entry.map(|e| e.value))
    }
}
