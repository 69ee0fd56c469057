//! Lambda resolution for the entrypoint.
//!
//! The entrypoint only needs to turn `(namespace, uuid)` into a [`Lambda`].
//! In a single-process deployment the [`LambdaManager`] answers directly; a
//! standalone entrypoint asks a remote manager through [`ManagerClient`].
//! Either way, resolution failures reach the caller with their meaning
//! intact: a missing lambda stays `NotFound`.

use std::time::Duration;

use async_trait::async_trait;
use stratus_proto::{
    convert::{already_exists, required_lambda, status_to_error},
    proto::{
        CreateLambdaRequest, DeleteLambdaRequest, GetBundleRequest, GetLambdaRequest,
        LambdaExistsRequest, lambda_manager_service_client::LambdaManagerServiceClient,
    },
};
use stratus_types::{
    BundleHash, Lambda, LambdaError, LambdaUuid, Namespace, Result, config::BundleConfig,
    error::InvalidArgumentSnafu,
};
use tonic::{Code, Request, Status, transport::Channel};
use tracing::{debug, warn};

use crate::manager::LambdaManager;

/// Default timeout for calls to a remote manager.
const DEFAULT_MANAGER_TIMEOUT: Duration = Duration::from_secs(10);

/// Resolves a lambda by its identity.
#[async_trait]
pub trait LambdaResolver: Send + Sync + 'static {
    /// Fetches the lambda registered as `uuid` in `namespace`.
    async fn resolve(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<Lambda>;
}

#[async_trait]
impl LambdaResolver for LambdaManager {
    async fn resolve(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<Lambda> {
        self.get(namespace, uuid)
    }
}

/// Client of a remote `LambdaManagerService`.
#[derive(Debug, Clone)]
pub struct ManagerClient {
    client: LambdaManagerServiceClient<Channel>,
    timeout: Duration,
}

impl ManagerClient {
    /// Creates a client over an existing channel.
    ///
    /// Messages up to [`BundleConfig::max_message_bytes`] of the default
    /// bundle limit are accepted in both directions.
    pub fn from_channel(channel: Channel) -> Self {
        Self { client: LambdaManagerServiceClient::new(channel), timeout: DEFAULT_MANAGER_TIMEOUT }
            .with_max_message_size(BundleConfig::default().max_message_bytes())
    }

    /// Creates a client that connects to `endpoint` on first use.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::InvalidArgument`] if `endpoint` is not a valid URI.
    pub fn connect_lazy(endpoint: impl Into<String>) -> Result<Self> {
        let endpoint = endpoint.into();
        let channel = Channel::from_shared(endpoint.clone())
            .map_err(|e| {
                InvalidArgumentSnafu { message: format!("manager endpoint {endpoint:?}: {e}") }
                    .build()
            })?
            .connect_lazy();
        Ok(Self::from_channel(channel))
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the largest message sent or received, in bytes.
    #[must_use]
    pub fn with_max_message_size(mut self, bytes: usize) -> Self {
        self.client =
            self.client.max_decoding_message_size(bytes).max_encoding_message_size(bytes);
        self
    }

    /// Registers a lambda remotely.
    ///
    /// # Errors
    ///
    /// Returns the remote error, with `AlreadyExists` carrying this lambda's identity.
    pub async fn create(&self, lambda: Lambda, bundle_data: Vec<u8>) -> Result<Lambda> {
        let request = CreateLambdaRequest {
            namespace: lambda.namespace.to_string(),
            uuid: lambda.uuid.to_string(),
            runtime: lambda.runtime.to_string(),
            bundle_hash: lambda.bundle_hash.to_string(),
            bundle_data,
            ensure_exactly_one_delivery: lambda.ensure_exactly_one_delivery,
        };
        let response =
            self.client.clone().create(self.request(request)).await.map_err(|status| {
                already_exists(&log_failure("create", status), &lambda.namespace, &lambda.uuid)
            })?;
        required_lambda(response.into_inner().lambda)
    }

    /// Deletes a lambda remotely.
    ///
    /// # Errors
    ///
    /// Returns the remote error.
    pub async fn delete(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<()> {
        let request =
            DeleteLambdaRequest { namespace: namespace.to_string(), uuid: uuid.to_string() };
        self.client
            .clone()
            .delete(self.request(request))
            .await
            .map_err(|status| status_to_error(&log_failure("delete", status)))?;
        Ok(())
    }

    /// Checks a lambda's existence remotely.
    ///
    /// # Errors
    ///
    /// Returns the remote error.
    pub async fn exists(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<bool> {
        let request =
            LambdaExistsRequest { namespace: namespace.to_string(), uuid: uuid.to_string() };
        let response = self
            .client
            .clone()
            .exists(self.request(request))
            .await
            .map_err(|status| status_to_error(&log_failure("exists", status)))?;
        Ok(response.into_inner().exists)
    }

    /// Fetches a lambda remotely.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::NotFound`] if the remote manager has no such
    /// lambda, otherwise the remote error.
    pub async fn get(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<Lambda> {
        let request = GetLambdaRequest { namespace: namespace.to_string(), uuid: uuid.to_string() };
        let response =
            self.client.clone().get(self.request(request)).await.map_err(|status| {
                if status.code() == Code::NotFound {
                    LambdaError::lambda_not_found(namespace, uuid)
                } else {
                    status_to_error(&log_failure("get", status))
                }
            })?;
        required_lambda(response.into_inner().lambda)
    }

    /// Fetches a bundle's payload remotely.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::NotFound`] if the remote manager has no such
    /// bundle, otherwise the remote error.
    pub async fn get_bundle(&self, hash: &BundleHash) -> Result<Vec<u8>> {
        let request = GetBundleRequest { bundle_hash: hash.to_string() };
        let response =
            self.client.clone().get_bundle(self.request(request)).await.map_err(|status| {
                if status.code() == Code::NotFound {
                    LambdaError::bundle_not_found(hash)
                } else {
                    status_to_error(&log_failure("get_bundle", status))
                }
            })?;
        Ok(response.into_inner().data)
    }

    fn request<T>(&self, message: T) -> Request<T> {
        let mut request = Request::new(message);
        request.set_timeout(self.timeout);
        request
    }
}

#[async_trait]
impl LambdaResolver for ManagerClient {
    async fn resolve(&self, namespace: &Namespace, uuid: &LambdaUuid) -> Result<Lambda> {
        debug!(namespace = %namespace, uuid = %uuid, "Resolving lambda through remote manager");
        self.get(namespace, uuid).await
    }
}

fn log_failure(operation: &'static str, status: Status) -> Status {
    warn!(
        operation,
        code = ?status.code(),
        error = %status.message(),
        "Remote manager call failed"
    );
    status
}
