//! `NamespaceService` over a [`StaticNamespaces`] registry.
//!
//! Lets a single-process deployment answer its own namespace checks, and a
//! standalone manager point its [`GrpcNamespaceDirectory`](crate::GrpcNamespaceDirectory)
//! at a peer serving a fixed tenant list.

use std::sync::Arc;

use stratus_proto::proto::{
    NamespaceExistsRequest, NamespaceExistsResponse, namespace_service_server::NamespaceService,
};
use stratus_types::{Namespace, config::ValidationConfig, validation};
use tonic::{Request, Response, Status};

use super::helpers::validation_status;
use crate::namespace::StaticNamespaces;

/// Namespace existence RPC.
pub struct NamespaceServiceImpl {
    namespaces: Arc<StaticNamespaces>,
    validation: ValidationConfig,
}

impl NamespaceServiceImpl {
    /// Creates the service.
    pub fn new(namespaces: Arc<StaticNamespaces>) -> Self {
        Self { namespaces, validation: ValidationConfig::default() }
    }
}

#[tonic::async_trait]
impl NamespaceService for NamespaceServiceImpl {
    async fn exists(
        &self,
        request: Request<NamespaceExistsRequest>,
    ) -> Result<Response<NamespaceExistsResponse>, Status> {
        let req = request.into_inner();
        validation::validate_namespace(&req.name, &self.validation)
            .map_err(|e| validation_status(&e))?;
        let exists = self.namespaces.contains(&Namespace::new(req.name));
        Ok(Response::new(NamespaceExistsResponse { exists }))
    }
}
