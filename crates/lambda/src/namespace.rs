//! Namespace existence checks.
//!
//! Creating a lambda is gated on its namespace existing in the external
//! namespace service. [`NamespaceDirectory`] is the seam:
//!
//! - [`GrpcNamespaceDirectory`] asks a remote `NamespaceService`.
//! - [`StaticNamespaces`] answers from an in-memory set (single-process
//!   deployments and tests), and also backs the local `NamespaceService`.
//! - [`CachedNamespaceDirectory`] remembers positive answers for a TTL.
//!   Negative answers are never cached so a freshly created namespace is
//!   usable immediately.
//!
//! The global namespace (empty string) exists implicitly; callers skip the
//! check for it.

use std::{
    collections::HashSet,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use stratus_proto::{
    convert::status_to_error,
    proto::{NamespaceExistsRequest, namespace_service_client::NamespaceServiceClient},
};
use stratus_types::{LambdaError, Namespace, Result, error::InvalidArgumentSnafu};
use tonic::{Request, transport::Channel};
use tracing::{debug, warn};

/// Timeout for a single remote existence check.
const EXISTS_TIMEOUT: Duration = Duration::from_secs(5);

/// Answers whether a namespace exists.
#[async_trait]
pub trait NamespaceDirectory: Send + Sync + 'static {
    /// Whether `namespace` exists.
    async fn exists(&self, namespace: &Namespace) -> Result<bool>;
}

/// Fixed, in-memory set of namespaces.
#[derive(Debug, Default)]
pub struct StaticNamespaces {
    names: RwLock<HashSet<Namespace>>,
}

impl StaticNamespaces {
    /// Creates a set containing `names`.
    pub fn new<I, N>(names: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Namespace>,
    {
        Self { names: RwLock::new(names.into_iter().map(Into::into).collect()) }
    }

    /// Adds a namespace. Returns whether it was new.
    pub fn insert(&self, namespace: impl Into<Namespace>) -> bool {
        self.names.write().insert(namespace.into())
    }

    /// Removes a namespace. Returns whether it was present.
    pub fn remove(&self, namespace: &Namespace) -> bool {
        self.names.write().remove(namespace)
    }

    /// Synchronous membership check.
    pub fn contains(&self, namespace: &Namespace) -> bool {
        namespace.is_global() || self.names.read().contains(namespace)
    }
}

#[async_trait]
impl NamespaceDirectory for StaticNamespaces {
    async fn exists(&self, namespace: &Namespace) -> Result<bool> {
        Ok(self.contains(namespace))
    }
}

/// Client of a remote `NamespaceService`.
#[derive(Debug, Clone)]
pub struct GrpcNamespaceDirectory {
    client: NamespaceServiceClient<Channel>,
}

impl GrpcNamespaceDirectory {
    /// Creates a client over an existing channel.
    pub fn from_channel(channel: Channel) -> Self {
        Self { client: NamespaceServiceClient::new(channel) }
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
                InvalidArgumentSnafu { message: format!("namespace endpoint {endpoint:?}: {e}") }
                    .build()
            })?
            .connect_lazy();
        Ok(Self::from_channel(channel))
    }
}

#[async_trait]
impl NamespaceDirectory for GrpcNamespaceDirectory {
    async fn exists(&self, namespace: &Namespace) -> Result<bool> {
        let mut request = Request::new(NamespaceExistsRequest { name: namespace.to_string() });
        request.set_timeout(EXISTS_TIMEOUT);
        let response = self.client.clone().exists(request).await.map_err(|status| {
            warn!(namespace = %namespace, error = %status, "Namespace existence check failed");
            status_to_error(&status)
        })?;
        Ok(response.into_inner().exists)
    }
}

/// Caches positive answers of another directory for `ttl`.
pub struct CachedNamespaceDirectory<D> {
    inner: D,
    ttl: Duration,
    known: DashMap<Namespace, Instant>,
}

impl<D: NamespaceDirectory> CachedNamespaceDirectory<D> {
    /// Wraps `inner`.
    pub fn new(inner: D, ttl: Duration) -> Self {
        Self { inner, ttl, known: DashMap::new() }
    }

    /// Drops every cached answer.
    pub fn clear(&self) {
        self.known.clear();
    }

    fn is_fresh(&self, namespace: &Namespace) -> bool {
        self.known.get(namespace).is_some_and(|seen| seen.elapsed() < self.ttl)
    }
}

#[async_trait]
impl<D: NamespaceDirectory> NamespaceDirectory for CachedNamespaceDirectory<D> {
    async fn exists(&self, namespace: &Namespace) -> Result<bool> {
        if self.is_fresh(namespace) {
            debug!(namespace = %namespace, "Namespace existence served from cache");
            return Ok(true);
        }
        let exists = self.inner.exists(namespace).await?;
        if exists {
            self.known.insert(namespace.clone(), Instant::now());
        } else {
            self.known.remove(namespace);
        }
        Ok(exists)
    }
}

impl<D> std::fmt::Debug for CachedNamespaceDirectory<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedNamespaceDirectory")
            .field("ttl", &self.ttl)
            .field("cached", &self.known.len())
            .finish()
    }
}

/// Fails with `FailedPrecondition` unless `namespace` exists.
///
/// The global namespace always passes without consulting `directory`.
pub(crate) async fn require_namespace(
    directory: &dyn NamespaceDirectory,
    namespace: &Namespace,
) -> Result<()> {
    if namespace.is_global() || directory.exists(namespace).await? {
        return Ok(());
    }
    Err(LambdaError::FailedPrecondition {
        message: format!("namespace {namespace:?} does not exist"),
    })
}
