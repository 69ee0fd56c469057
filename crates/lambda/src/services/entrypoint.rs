//! `LambdaEntrypointService` over an [`Entrypoint`].
//!
//! Worker-reported failures leave this service with the worker's own gRPC
//! code, so a client tells "no such lambda" (`NOT_FOUND`), "no answer in
//! time" (`DEADLINE_EXCEEDED`) and "answered with an error" apart.

use std::sync::Arc;

use stratus_proto::{
    convert::error_to_status,
    proto::{
        CallRequest, CallResponse, ExecuteRequest, ExecuteResponse,
        lambda_entrypoint_service_server::LambdaEntrypointService,
    },
};
use stratus_types::{LambdaUuid, Namespace, config::ValidationConfig, validation};
use tonic::{Request, Response, Status};

use super::helpers::{validate_identity, validation_status};
use crate::entrypoint::Entrypoint;

/// Invocation RPCs.
pub struct LambdaEntrypointServiceImpl {
    entrypoint: Arc<Entrypoint>,
    validation: ValidationConfig,
}

impl LambdaEntrypointServiceImpl {
    /// Creates the service with default validation limits.
    pub fn new(entrypoint: Arc<Entrypoint>) -> Self {
        Self { entrypoint, validation: ValidationConfig::default() }
    }

    /// Overrides the request validation limits.
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }

    fn validate(&self, namespace: &str, uuid: &str, payload: &[u8]) -> Result<(), Status> {
        validate_identity(namespace, uuid, &self.validation)?;
        validation::validate_payload(payload, &self.validation).map_err(|e| validation_status(&e))
    }
}

#[tonic::async_trait]
impl LambdaEntrypointService for LambdaEntrypointServiceImpl {
    async fn call(&self, request: Request<CallRequest>) -> Result<Response<CallResponse>, Status> {
        let req = request.into_inner();
        self.validate(&req.namespace, &req.uuid, &req.payload)?;
        self.entrypoint
            .call(&Namespace::new(req.namespace), &LambdaUuid::new(req.uuid), req.payload)
            .await
            .map_err(|e| error_to_status(&e))?;
        Ok(Response::new(CallResponse {}))
    }

    async fn execute(
        &self,
        request: Request<ExecuteRequest>,
    ) -> Result<Response<ExecuteResponse>, Status> {
        let req = request.into_inner();
        self.validate(&req.namespace, &req.uuid, &req.payload)?;
        let payload = self
            .entrypoint
            .execute(
                &Namespace::new(req.namespace),
                &LambdaUuid::new(req.uuid),
                req.payload,
                req.timeout_millis,
            )
            .await
            .map_err(|e| error_to_status(&e))?;
        Ok(Response::new(ExecuteResponse { payload }))
    }
}
