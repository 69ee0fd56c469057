//! Content-addressed, reference-counted bundle storage.
//!
//! Bundles are global: identical code uploaded by lambdas in different
//! namespaces is stored once. Payloads live in
//! [`BundleData`](stratus_store::tables::BundleData) and reference counts in
//! [`BundleRefs`](stratus_store::tables::BundleRefs); both are only mutated
//! through [`BundleStore`], which borrows the caller's write transaction and
//! therefore never commits on its own.

use stratus_store::{
    Database, WriteTransaction,
    tables::{BundleData, BundleRefs},
};
use stratus_types::{BundleHash, LambdaError, error::InternalSnafu};

use crate::error::{TxnResult, storage_error};

/// Bundle mutations staged inside a caller-owned transaction.
pub struct BundleStore<'t, 'db> {
    txn: &'t mut WriteTransaction<'db>,
}

impl<'t, 'db> BundleStore<'t, 'db> {
    /// Wraps a write transaction.
    pub fn new(txn: &'t mut WriteTransaction<'db>) -> Self {
        Self { txn }
    }

    /// Adds one reference to `hash`, storing `data` if the bundle is new.
    ///
    /// Existing payloads are left untouched. Returns the new reference count.
    pub(crate) fn acquire(&mut self, hash: &BundleHash, data: &[u8]) -> TxnResult<u64> {
        self.upsert(hash, data)?;
        self.increment_reference(hash)
    }

    /// Drops one reference to `hash` and deletes the bundle once unreferenced.
    ///
    /// Returns the remaining reference count.
    pub(crate) fn release(&mut self, hash: &BundleHash) -> TxnResult<u64> {
        let remaining = self.decrement_reference(hash)?;
        if remaining == 0 {
            self.delete_if_unreferenced(hash)?;
        }
        Ok(remaining)
    }

    /// Inserts the bundle with a zero reference count if it does not exist.
    ///
    /// Returns whether it was inserted.
    fn upsert(&mut self, hash: &BundleHash, data: &[u8]) -> TxnResult<bool> {
        if self.txn.contains::<BundleRefs>(hash)? {
            return Ok(false);
        }
        self.txn.insert::<BundleRefs>(hash, &0)?;
        self.txn.insert::<BundleData>(hash, &data.to_vec())?;
        Ok(true)
    }

    fn increment_reference(&mut self, hash: &BundleHash) -> TxnResult<u64> {
        let Some(count) = self.txn.get::<BundleRefs>(hash)? else {
            return Err(LambdaError::bundle_not_found(hash).into());
        };
        let count = count.checked_add(1).ok_or_else(|| {
            InternalSnafu { message: format!("reference count overflow for bundle {hash}") }
                .build()
        })?;
        self.txn.insert::<BundleRefs>(hash, &count)?;
        Ok(count)
    }

    fn decrement_reference(&mut self, hash: &BundleHash) -> TxnResult<u64> {
        let Some(count) = self.txn.get::<BundleRefs>(hash)? else {
            return Err(LambdaError::bundle_not_found(hash).into());
        };
        let Some(count) = count.checked_sub(1) else {
            return Err(InternalSnafu {
                message: format!("reference count of bundle {hash} is already zero"),
            }
            .build()
            .into());
        };
        self.txn.insert::<BundleRefs>(hash, &count)?;
        Ok(count)
    }

    /// Removes the bundle if its reference count is zero.
    ///
    /// Absent or still-referenced bundles are left alone. Returns whether the
    /// bundle was deleted.
    fn delete_if_unreferenced(&mut self, hash: &BundleHash) -> TxnResult<bool> {
        match self.txn.get::<BundleRefs>(hash)? {
            Some(0) => {
                self.txn.delete::<BundleRefs>(hash)?;
                self.txn.delete::<BundleData>(hash)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// Reads a bundle's payload.
///
/// # Errors
///
/// Returns [`LambdaError::NotFound`] if no bundle is stored under `hash`.
pub fn read_bundle(db: &Database, hash: &BundleHash) -> Result<Vec<u8>, LambdaError> {
    db.read()
        .get::<BundleData>(hash)
        .map_err(|e| storage_error(&e))?
        .ok_or_else(|| LambdaError::bundle_not_found(hash))
}

/// Current reference count of a bundle, or `None` if it is not stored.
///
/// # Errors
///
/// Returns [`LambdaError::Storage`] if the count cannot be decoded.
pub fn reference_count(db: &Database, hash: &BundleHash) -> Result<Option<u64>, LambdaError> {
    db.read().get::<BundleRefs>(hash).map_err(|e| storage_error(&e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use stratus_types::ErrorCode;

    use super::*;

    fn acquire(db: &Database, hash: &BundleHash, data: &[u8]) -> u64 {
        let mut txn = db.write();
        let count = BundleStore::new(&mut txn).acquire(hash, data).unwrap();
        txn.commit().unwrap();
        count
    }

    fn release(db: &Database, hash: &BundleHash) -> TxnResult<u64> {
        let mut txn = db.write();
        let count = BundleStore::new(&mut txn).release(hash)?;
        txn.commit()?;
        Ok(count)
    }

    #[test]
    fn test_first_acquire_stores_payload() {
        let db = Database::open_in_memory();
        let hash = BundleHash::new("h1");

        assert_eq!(acquire(&db, &hash, b"code"), 1);
        assert_eq!(read_bundle(&db, &hash).unwrap(), b"code");
        assert_eq!(reference_count(&db, &hash).unwrap(), Some(1));
    }

    #[test]
    fn test_second_acquire_keeps_original_payload() {
        let db = Database::open_in_memory();
        let hash = BundleHash::new("h1");

        acquire(&db, &hash, b"first");
        assert_eq!(acquire(&db, &hash, b"second"), 2);
        assert_eq!(read_bundle(&db, &hash).unwrap(), b"first");
    }

    #[test]
    fn test_release_deletes_at_zero() {
        let db = Database::open_in_memory();
        let hash = BundleHash::new("h1");
        acquire(&db, &hash, b"code");
        acquire(&db, &hash, b"code");

        assert_eq!(release(&db, &hash).unwrap(), 1);
        assert!(read_bundle(&db, &hash).is_ok());

        assert_eq!(release(&db, &hash).unwrap(), 0);
        assert_eq!(reference_count(&db, &hash).unwrap(), None);
        let err = read_bundle(&db, &hash).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_release_of_missing_bundle_is_rejected() {
        let db = Database::open_in_memory();
        let err: LambdaError = release(&db, &BundleHash::new("ghost")).unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn test_release_never_goes_negative() {
        let db = Database::open_in_memory();
        let hash = BundleHash::new("h1");
        {
            let mut txn = db.write();
            txn.insert::<BundleRefs>(&hash, &0).unwrap();
            txn.commit().unwrap();
        }

        let err: LambdaError = release(&db, &hash).unwrap_err().into();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(reference_count(&db, &hash).unwrap(), Some(0));
    }

    #[test]
    fn test_delete_if_unreferenced_ignores_referenced_and_absent() {
        let db = Database::open_in_memory();
        let hash = BundleHash::new("h1");
        acquire(&db, &hash, b"code");

        let mut txn = db.write();
        let mut store = BundleStore::new(&mut txn);
        assert!(!store.delete_if_unreferenced(&hash).unwrap());
        assert!(!store.delete_if_unreferenced(&BundleHash::new("ghost")).unwrap());
        txn.commit().unwrap();

        assert_eq!(reference_count(&db, &hash).unwrap(), Some(1));
    }

    #[test]
    fn test_aborted_acquire_leaves_no_trace() {
        let db = Database::open_in_memory();
        let hash = BundleHash::new("h1");

        let mut txn = db.write();
        BundleStore::new(&mut txn).acquire(&hash, b"code").unwrap();
        txn.abort();

        assert_eq!(reference_count(&db, &hash).unwrap(), None);
        assert!(read_bundle(&db, &hash).is_err());
    }
}
