//! Namespace-scoped lambda records.
//!
//! The directory is one logical table partitioned by namespace. A namespace's
//! partition is created lazily by [`ensure_namespace`] before the first write
//! into it, outside any transaction.

use stratus_store::{
    Database, StoreError, TableId, WriteTransaction,
    tables::{LambdaDirectory, LambdaKey},
};
use stratus_types::{BundleHash, Lambda, LambdaError, LambdaUuid, Namespace};

use crate::error::{TxnResult, storage_error};

/// Directory mutations staged inside a caller-owned transaction.
pub struct Directory<'t, 'db> {
    txn: &'t mut WriteTransaction<'db>,
}

impl<'t, 'db> Directory<'t, 'db> {
    /// Wraps a write transaction.
    pub fn new(txn: &'t mut WriteTransaction<'db>) -> Self {
        Self { txn }
    }

    /// Stages the insertion of `lambda`.
    ///
    /// Fails with [`LambdaError::AlreadyExists`] if its `(namespace, uuid)` is taken.
    pub(crate) fn insert(&mut self, lambda: &Lambda) -> TxnResult<()> {
        let key = LambdaKey::new(&lambda.namespace, &lambda.uuid);
        match self.txn.insert_unique::<LambdaDirectory>(&key, lambda) {
            Err(StoreError::DuplicateKey { .. }) => Err(LambdaError::AlreadyExists {
                namespace: lambda.namespace.clone(),
                uuid: lambda.uuid.clone(),
            }
            .into()),
            other => Ok(other?),
        }
    }

    /// Stages the removal of a lambda, returning the record it removed.
    ///
    /// `None` means the record was already gone as seen by this transaction.
    pub(crate) fn remove(
        &mut self,
        namespace: &Namespace,
        uuid: &LambdaUuid,
    ) -> TxnResult<Option<Lambda>> {
        let key = LambdaKey::new(namespace, uuid);
        let Some(lambda) = self.txn.get::<LambdaDirectory>(&key)? else {
            return Ok(None);
        };
        self.txn.delete::<LambdaDirectory>(&key)?;
        Ok(Some(lambda))
    }
}

/// Creates the directory partition for `namespace` if it does not exist.
///
/// Idempotent. Returns whether the partition was created by this call.
pub fn ensure_namespace(db: &Database, namespace: &Namespace) -> bool {
    db.ensure_partition(TableId::LambdaDirectory, namespace.as_str())
}

/// Reads a lambda record.
///
/// # Errors
///
/// Returns [`LambdaError::Storage`] if the record cannot be decoded.
pub fn lookup(
    db: &Database,
    namespace: &Namespace,
    uuid: &LambdaUuid,
) -> Result<Option<Lambda>, LambdaError> {
    db.read()
        .get::<LambdaDirectory>(&LambdaKey::new(namespace, uuid))
        .map_err(|e| storage_error(&e))
}

/// Bundle hash referenced by a lambda, if the lambda exists.
///
/// # Errors
///
/// Same as [`lookup`].
pub fn bundle_hash_of(
    db: &Database,
    namespace: &Namespace,
    uuid: &LambdaUuid,
) -> Result<Option<BundleHash>, LambdaError> {
    Ok(lookup(db, namespace, uuid)?.map(|lambda| lambda.bundle_hash))
}

/// Whether a lambda record exists.
///
/// # Errors
///
/// Returns [`LambdaError::Storage`] on key encoding failure.
pub fn contains(
    db: &Database,
    namespace: &Namespace,
    uuid: &LambdaUuid,
) -> Result<bool, LambdaError> {
    db.read()
        .contains::<LambdaDirectory>(&LambdaKey::new(namespace, uuid))
        .map_err(|e| storage_error(&e))
}
