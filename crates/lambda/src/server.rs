//! gRPC server for the Stratus lambda subsystem.
//!
//! A process serves any combination of:
//! - LambdaManagerService: directory and bundle operations
//! - LambdaEntrypointService: `Call` and `Execute`
//! - NamespaceService: existence checks against a static tenant list

use std::{net::SocketAddr, sync::Arc, time::Duration};

use stratus_proto::proto::{
    lambda_entrypoint_service_server::LambdaEntrypointServiceServer,
    lambda_manager_service_server::LambdaManagerServiceServer,
    namespace_service_server::NamespaceServiceServer,
};
use stratus_types::config::{BundleConfig, ValidationConfig};
use tokio::{net::TcpListener, sync::watch};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tower::ServiceBuilder;
use tracing::info;

use crate::{
    entrypoint::Entrypoint,
    manager::LambdaManager,
    namespace::StaticNamespaces,
    services::{LambdaEntrypointServiceImpl, LambdaManagerServiceImpl, NamespaceServiceImpl},
};

/// Error returned when the server cannot start or its transport fails.
pub type ServeError = Box<dyn std::error::Error + Send + Sync>;

/// The lambda gRPC server.
///
/// Services are registered for whichever of `manager`, `entrypoint` and
/// `namespaces` are set. Supports graceful shutdown via a `shutdown_rx`
/// watch channel.
#[derive(bon::Builder)]
#[builder(on(_, required))]
pub struct LambdaServer {
    /// Server address. Ignored by [`serve_with_listener`](Self::serve_with_listener).
    addr: SocketAddr,
    /// Directory manager to expose.
    #[builder(default)]
    manager: Option<Arc<LambdaManager>>,
    /// Invocation entrypoint to expose.
    #[builder(default)]
    entrypoint: Option<Arc<Entrypoint>>,
    /// Namespace registry to expose.
    #[builder(default)]
    namespaces: Option<Arc<StaticNamespaces>>,
    /// Request validation limits.
    #[builder(default)]
    validation: ValidationConfig,
    /// Max concurrent requests per connection.
    #[builder(default = 100)]
    max_concurrent: usize,
    /// Largest encoded or decoded gRPC message. Must fit the largest bundle.
    #[builder(default = BundleConfig::default().max_message_bytes())]
    max_message_bytes: usize,
    /// Per-request timeout. Must exceed the longest `Execute` wait.
    #[builder(default = Duration::from_secs(330))]
    request_timeout: Duration,
    /// Shutdown signal receiver. When `true` is sent, the server stops.
    #[builder(default)]
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl LambdaServer {
    /// Binds the configured address and serves until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be bound or the transport fails.
    pub async fn serve(self) -> Result<(), ServeError> {
        let listener = TcpListener::bind(self.addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Serves on an already bound listener until shut down.
    ///
    /// # Errors
    ///
    /// Returns an error on a transport-level failure.
    pub async fn serve_with_listener(self, listener: TcpListener) -> Result<(), ServeError> {
        let local_addr = listener.local_addr()?;
        info!(
            max_concurrent = self.max_concurrent,
            max_message_bytes = self.max_message_bytes,
            request_timeout = ?self.request_timeout,
            "Configuring request limits"
        );

        // RateLimitLayer is not Clone, which tonic requires; concurrency_limit
        // plus load_shed gives the backpressure instead.
        let layer = ServiceBuilder::new()
            .concurrency_limit(self.max_concurrent)
            .load_shed()
            .timeout(self.request_timeout)
            .into_inner();

        let max_message_bytes = self.max_message_bytes;
        let manager = self.manager.map(|manager| {
            LambdaManagerServiceServer::new(
                LambdaManagerServiceImpl::new(manager).with_validation(self.validation.clone()),
            )
            .max_decoding_message_size(max_message_bytes)
            .max_encoding_message_size(max_message_bytes)
        });
        let entrypoint = self.entrypoint.map(|entrypoint| {
            LambdaEntrypointServiceServer::new(
                LambdaEntrypointServiceImpl::new(entrypoint)
                    .with_validation(self.validation.clone()),
            )
            .max_decoding_message_size(max_message_bytes)
            .max_encoding_message_size(max_message_bytes)
        });
        let namespaces = self
            .namespaces
            .map(|namespaces| NamespaceServiceServer::new(NamespaceServiceImpl::new(namespaces)));

        info!(
            addr = %local_addr,
            manager = manager.is_some(),
            entrypoint = entrypoint.is_some(),
            namespaces = namespaces.is_some(),
            "Starting lambda gRPC server"
        );

        let router = Server::builder()
            .layer(layer)
            .add_optional_service(manager)
            .add_optional_service(entrypoint)
            .add_optional_service(namespaces);

        let shutdown_rx = self.shutdown_rx;
        let signal = async move {
            match shutdown_rx {
                Some(mut shutdown_rx) => {
                    let _ = shutdown_rx.wait_for(|v| *v).await;
                    info!("Shutdown signal received, stopping gRPC server");
                },
                None => std::future::pending::<()>().await,
            }
        };
        router.serve_with_incoming_shutdown(TcpListenerStream::new(listener), signal).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use stratus_proto::proto::{
        NamespaceExistsRequest, namespace_service_client::NamespaceServiceClient,
    };

    use super::*;

    #[tokio::test]
    async fn test_serves_until_shutdown_signal() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let server = LambdaServer::builder()
            .addr(addr)
            .namespaces(Some(Arc::new(StaticNamespaces::new(["acme"]))))
            .shutdown_rx(Some(shutdown_rx))
            .build();
        let handle = tokio::spawn(server.serve_with_listener(listener));

        let mut client = NamespaceServiceClient::connect(format!("http://{addr}")).await.unwrap();
        let exists = client
            .exists(NamespaceExistsRequest { name: "acme".to_string() })
            .await
            .unwrap()
            .into_inner()
            .exists;
        assert!(exists);
        drop(client);

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap().unwrap();
    }
}
