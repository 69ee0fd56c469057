//! Process bootstrap by role.
//!
//! Wires the store, broker and namespace collaborators into the services
//! this process hosts and returns a [`LambdaServer`] ready to serve.

use std::sync::Arc;

use snafu::{ResultExt, Snafu};
use stratus_broker::MessageBroker;
use stratus_lambda::{
    CachedNamespaceDirectory, Entrypoint, GrpcNamespaceDirectory, LambdaManager, LambdaResolver,
    LambdaServer, ManagerClient, NamespaceDirectory, StaticNamespaces,
};
use stratus_store::Database;
use stratus_types::LambdaError;
use tokio::sync::watch;
use tracing::info;

use crate::config::{Config, ConfigError};

/// Error type for bootstrap operations.
#[derive(Debug, Snafu)]
pub enum BootstrapError {
    /// The configuration is invalid.
    #[snafu(display("configuration error: {source}"))]
    Config {
        /// Underlying error.
        source: ConfigError,
    },
    /// A collaborator could not be created or the broker topology declared.
    #[snafu(display("failed to start {component}: {source}"))]
    Component {
        /// Component being started.
        component: &'static str,
        /// Underlying error.
        source: LambdaError,
    },
}

/// Components of a bootstrapped process.
pub struct BootstrappedNode {
    /// The configured gRPC server.
    pub server: LambdaServer,
    /// The local manager, for the `manager` and `all` roles.
    pub manager: Option<Arc<LambdaManager>>,
    /// The entrypoint, for the `entrypoint` and `all` roles.
    pub entrypoint: Option<Arc<Entrypoint>>,
    /// The local namespace registry.
    pub namespaces: Arc<StaticNamespaces>,
}

/// Builds the services selected by `config.role`.
///
/// # Errors
///
/// Returns [`BootstrapError`] if the configuration is invalid, an endpoint
/// is malformed, or the broker refuses the topology.
pub async fn bootstrap_node(
    config: &Config,
    broker: Arc<dyn MessageBroker>,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<BootstrappedNode, BootstrapError> {
    config.validate().context(ConfigSnafu)?;

    let namespaces = Arc::new(StaticNamespaces::new(config.namespaces.names.iter().cloned()));

    let manager = if config.hosts_manager() {
        let directory: Arc<dyn NamespaceDirectory> = match &config.namespaces.endpoint {
            Some(endpoint) => {
                info!(endpoint = %endpoint, "Checking namespaces against remote service");
                let remote = GrpcNamespaceDirectory::connect_lazy(endpoint.clone())
                    .context(ComponentSnafu { component: "namespace client" })?;
                Arc::new(CachedNamespaceDirectory::new(remote, config.namespace_cache_ttl()))
            },
            None => Arc::clone(&namespaces) as Arc<dyn NamespaceDirectory>,
        };
        let manager = LambdaManager::builder()
            .db(Arc::new(Database::open_in_memory()))
            .namespaces(directory)
            .retry(config.transactions)
            .bundles(config.bundles)
            .build();
        Some(Arc::new(manager))
    } else {
        None
    };

    let entrypoint = if config.hosts_entrypoint() {
        let resolver: Arc<dyn LambdaResolver> = match (&manager, &config.manager_endpoint) {
            (Some(manager), _) => Arc::clone(manager) as Arc<dyn LambdaResolver>,
            (None, Some(endpoint)) => {
                info!(endpoint = %endpoint, "Resolving lambdas through remote manager");
                Arc::new(
                    ManagerClient::connect_lazy(endpoint.clone())
                        .context(ComponentSnafu { component: "manager client" })?
                        .with_max_message_size(config.max_message_bytes()),
                )
            },
            (None, None) => {
                return Err(BootstrapError::Config {
                    source: ConfigError::Invalid {
                        message: "the entrypoint role requires manager_endpoint".to_string(),
                    },
                });
            },
        };
        let entrypoint = Entrypoint::start(resolver, broker, &config.broker, config.entrypoint)
            .await
            .context(ComponentSnafu { component: "entrypoint" })?;
        Some(Arc::new(entrypoint))
    } else {
        None
    };

    info!(
        role = ?config.role,
        namespaces = config.namespaces.names.len(),
        "Bootstrap complete"
    );

    let server = LambdaServer::builder()
        .addr(config.listen_addr)
        .manager(manager.clone())
        .entrypoint(entrypoint.clone())
        .namespaces(Some(Arc::clone(&namespaces)))
        .validation(config.validation.clone())
        .max_concurrent(config.limits.max_concurrent)
        .max_message_bytes(config.max_message_bytes())
        .request_timeout(config.request_timeout())
        .shutdown_rx(Some(shutdown_rx))
        .build();

    Ok(BootstrappedNode { server, manager, entrypoint, namespaces })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use stratus_broker::InMemoryBroker;

    use super::*;
    use crate::config::Role;

    #[tokio::test]
    async fn test_all_role_hosts_everything() {
        let (_tx, rx) = watch::channel(false);
        let mut config = Config::default();
        config.namespaces.names = vec!["acme".to_string()];

        let node = bootstrap_node(&config, Arc::new(InMemoryBroker::new()), rx).await.unwrap();
        assert!(node.manager.is_some());
        assert!(node.entrypoint.is_some());
        assert!(node.namespaces.contains(&stratus_types::Namespace::new("acme")));
    }

    #[tokio::test]
    async fn test_manager_role_skips_entrypoint() {
        let (_tx, rx) = watch::channel(false);
        let config = Config { role: Role::Manager, ..Config::default() };

        let node = bootstrap_node(&config, Arc::new(InMemoryBroker::new()), rx).await.unwrap();
        assert!(node.manager.is_some());
        assert!(node.entrypoint.is_none());
    }

    #[tokio::test]
    async fn test_invalid_manager_endpoint_fails() {
        let (_tx, rx) = watch::channel(false);
        let config = Config {
            role: Role::Entrypoint,
            manager_endpoint: Some("not a uri".to_string()),
            ..Config::default()
        };
        let err = bootstrap_node(&config, Arc::new(InMemoryBroker::new()), rx)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BootstrapError::Component { component: "manager client", .. }));
    }
}
