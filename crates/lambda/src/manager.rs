//! Lambda manager: transactional CRUD over the directory and the bundle store.
//!
//! Every mutation spans two independently located tables (the namespace's
//! directory partition and the global bundle tables) and runs as one
//! optimistic transaction through [`retry_transaction`]. A create that loses
//! the uniqueness check applies nothing; a delete that loses a race against
//! another delete adjusts no reference count.

use std::{future::ready, sync::Arc};

use stratus_store::{Database, retry_transaction};
use stratus_types::{
    BundleHash, Lambda, LambdaError, LambdaUuid, Namespace, Result,
    config::{BundleConfig, HashPolicy, TransactionRetryConfig},
    error::InvalidArgumentSnafu,
    hash::matches_hex_digest,
};
use tracing::{debug, info, instrument, warn};

use crate::{
    bundle::{self, BundleStore},
    directory::{self, Directory},
    error::{TransactionError, TxnResult},
    metrics,
    namespace::{NamespaceDirectory, require_namespace},
};

/// Owns lambda definitions and their bundles.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use stratus_lambda::{LambdaManager, StaticNamespaces};
/// # use stratus_store::Database;
/// let manager = LambdaManager::builder()
///     .db(Arc::new(Database::open_in_memory()))
///     .namespaces(Arc::new(StaticNamespaces::new(["acme"])))
///     .build();
/// ```
#[derive(bon::Builder)]
#[builder(on(_, required))]
pub struct LambdaManager {
    db: Arc<Database>,
    namespaces: Arc<dyn NamespaceDirectory>,
    #[builder(default)]
    retry: TransactionRetryConfig,
    #[builder(default)]
    bundles: BundleConfig,
}

impl LambdaManager {
    /// Registers a lambda and takes a reference on its bundle.
    ///
    /// `bundle_data` is stored only if no bundle with `lambda.bundle_hash`
    /// exists yet; otherwise the existing payload is shared.
    ///
    /// # Errors
    ///
    /// - [`LambdaError::FailedPrecondition`] if the namespace does not exist.
    /// - [`LambdaError::AlreadyExists`] if the uuid is taken in the namespace.
    ///   No reference is taken in that case.
    /// - [`LambdaError::InvalidArgument`] if the bundle violates the upload policy.
    /// - [`LambdaError::Storage`] if contention outlasts the retry budget.
    #[instrument(
        skip(self, lambda, bundle_data),
        fields(namespace = %lambda.namespace, uuid = %lambda.uuid)
    )]
    pub async fn create(&self, lambda: Lambda, bundle_data: &[u8]) -> Result<Lambda> {
        let result = self.create_inner(&lambda, bundle_data).await;
        metrics::record_create(outcome(&result));
        result.map(|()| lambda)
    }

    async fn create_inner(&self, lambda: &Lambda, bundle_data: &[u8]) -> Result<()> {
        self.check_bundle(&lambda.bundle_hash, bundle_data)?;
        require_namespace(self.namespaces.as_ref(), &lambda.namespace).await?;

        if directory::ensure_namespace(&self.db, &lambda.namespace) {
            info!(namespace = %lambda.namespace, "Created directory partition");
        }

        retry_transaction(self.retry.max_retries, TransactionError::is_transient, |attempt| {
            if attempt > 0 {
                metrics::record_transaction_retry("create");
            }
            ready(self.try_create(lambda, bundle_data))
        })
        .await?;

        info!(runtime = %lambda.runtime, bundle_hash = %lambda.bundle_hash, "Lambda created");
        Ok(())
    }

    fn try_create(&self, lambda: &Lambda, bundle_data: &[u8]) -> TxnResult<()> {
        let mut txn = self.db.write();
        Directory::new(&mut txn).insert(lambda)?;
        let references = BundleStore::new(&mut txn).acquire(&lambda.bundle_hash, bundle_data)?;
        txn.commit()?;
        debug!(bundle_hash = %lambda.bundle_hash, references, "Bundle reference taken");
        Ok(())
    }

    /// Removes a lambda and releases its bundle reference.
    ///
    /// Deleting an absent lambda succeeds without touching any bundle.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Storage`] if contention outlasts the retry budget.
    #[instrument(skip(self), fields(namespace = %namespace, uuid = %uuid))]
    pub async fn delete(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<()> {
        let result = self.delete_inner(namespace, uuid).await;
        metrics::record_delete(outcome(&result));
        result
    }

    async fn delete_inner(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<()> {
        if directory::bundle_hash_of(&self.db, namespace, uuid)?.is_none() {
            debug!("Lambda absent, nothing to delete");
            return Ok(());
        }

        let released = retry_transaction(
            self.retry.max_retries,
            TransactionError::is_transient,
            |attempt| {
                if attempt > 0 {
                    metrics::record_transaction_retry("delete");
                }
                ready(self.try_delete(namespace, uuid))
            },
        )
        .await?;

        match released {
            Some((hash, 0)) => info!(bundle_hash = %hash, "Lambda deleted, bundle reclaimed"),
            Some((hash, references)) => {
                info!(bundle_hash = %hash, references, "Lambda deleted")
            }
            None => debug!("Lambda removed concurrently, bundle left untouched"),
        }
        Ok(())
    }

    /// Returns the released bundle and its remaining references, or `None`
    /// if the record was already gone.
    fn try_delete(
        &self,
        namespace: &Namespace,
        uuid: &LambdaUuid,
    ) -> TxnResult<Option<(BundleHash, u64)>> {
        let mut txn = self.db.write();
        let Some(removed) = Directory::new(&mut txn).remove(namespace, uuid)? else {
            txn.abort();
            return Ok(None);
        };
        let remaining = BundleStore::new(&mut txn).release(&removed.bundle_hash)?;
        txn.commit()?;
        Ok(Some((removed.bundle_hash, remaining)))
    }

    /// Whether a lambda exists.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Storage`] on store failure.
    pub fn exists(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<bool> {
        directory::contains(&self.db, namespace, uuid)
    }

    /// Fetches a lambda.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::NotFound`] if it does not exist.
    pub fn get(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<Lambda> {
        directory::lookup(&self.db, namespace, uuid)?
            .ok_or_else(|| LambdaError::lambda_not_found(namespace, uuid))
    }

    /// Fetches a bundle's payload.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::NotFound`] if no bundle is stored under `hash`.
    pub fn get_bundle(&self, hash: &BundleHash) -> Result<Vec<u8>> {
        bundle::read_bundle(&self.db, hash)
    }

    /// Number of lambdas referencing a bundle, or `None` if it is not stored.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Storage`] on store failure.
    pub fn bundle_reference_count(&self, hash: &BundleHash) -> Result<Option<u64>> {
        bundle::reference_count(&self.db, hash)
    }

    /// Underlying store.
    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    fn check_bundle(&self, hash: &BundleHash, data: &[u8]) -> Result<()> {
        if data.len() > self.bundles.max_bundle_bytes {
            return InvalidArgumentSnafu {
                message: format!(
                    "bundle is {} bytes, limit is {}",
                    data.len(),
                    self.bundles.max_bundle_bytes
                ),
            }
            .fail();
        }
        if self.bundles.hash_policy == HashPolicy::VerifySha256
            && !matches_hex_digest(hash.as_str(), data)
        {
            warn!(bundle_hash = %hash, "Bundle hash does not match its content");
            return InvalidArgumentSnafu {
                message: format!("bundle_hash {hash} is not the SHA-256 of the bundle data"),
            }
            .fail();
        }
        Ok(())
    }
}

impl std::fmt::Debug for LambdaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LambdaManager")
            .field("retry", &self.retry)
            .field("bundles", &self.bundles)
            .finish_non_exhaustive()
    }
}

fn outcome<T>(result: &Result<T>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(LambdaError::AlreadyExists { .. }) => "already_exists",
        Err(LambdaError::FailedPrecondition { .. }) => "failed_precondition",
        Err(LambdaError::InvalidArgument { .. }) => "invalid_argument",
        Err(_) => "error",
    }
}
