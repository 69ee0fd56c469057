//! `LambdaManagerService` over a [`LambdaManager`].

use std::sync::Arc;

use stratus_proto::{
    convert::error_to_status,
    proto::{
        CreateLambdaRequest, CreateLambdaResponse, DeleteLambdaRequest, DeleteLambdaResponse,
        GetBundleRequest, GetBundleResponse, GetLambdaRequest, GetLambdaResponse,
        LambdaExistsRequest,
        LambdaExistsResponse, lambda_manager_service_server::LambdaManagerService,
    },
};
use stratus_types::{
    BundleHash, Lambda, LambdaUuid, Namespace, Runtime, config::ValidationConfig, validation,
};
use tonic::{Request, Response, Status};

use super::helpers::{validate_identity, validation_status};
use crate::manager::LambdaManager;

/// Directory management RPCs.
pub struct LambdaManagerServiceImpl {
    manager: Arc<LambdaManager>,
    validation: ValidationConfig,
}

impl LambdaManagerServiceImpl {
    /// Creates the service with default validation limits.
    pub fn new(manager: Arc<LambdaManager>) -> Self {
        Self { manager, validation: ValidationConfig::default() }
    }

    /// Overrides the request validation limits.
    #[must_use]
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = validation;
        self
    }
}

#[tonic::async_trait]
impl LambdaManagerService for LambdaManagerServiceImpl {
    async fn create(
        &self,
        request: Request<CreateLambdaRequest>,
    ) -> Result<Response<CreateLambdaResponse>, Status> {
        let req = request.into_inner();
        validate_identity(&req.namespace, &req.uuid, &self.validation)?;
        validation::validate_runtime(&req.runtime, &self.validation)
            .map_err(|e| validation_status(&e))?;
        validation::validate_bundle_hash(&req.bundle_hash, &self.validation)
            .map_err(|e| validation_status(&e))?;

        let lambda = Lambda {
            namespace: Namespace::new(req.namespace),
            uuid: LambdaUuid::new(req.uuid),
            runtime: Runtime::new(req.runtime),
            bundle_hash: BundleHash::new(req.bundle_hash),
            ensure_exactly_one_delivery: req.ensure_exactly_one_delivery,
        };
        let created = self
            .manager
            .create(lambda, &req.bundle_data)
            .await
            .map_err(|e| error_to_status(&e))?;
        Ok(Response::new(CreateLambdaResponse { lambda: Some(created.into()) }))
    }

    async fn delete(
        &self,
        request: Request<DeleteLambdaRequest>,
    ) -> Result<Response<DeleteLambdaResponse>, Status> {
        let req = request.into_inner();
        validate_identity(&req.namespace, &req.uuid, &self.validation)?;
        self.manager
            .delete(&Namespace::new(req.namespace), &LambdaUuid::new(req.uuid))
            .await
            .map_err(|e| error_to_status(&e))?;
        Ok(Response::new(DeleteLambdaResponse {}))
    }

    async fn exists(
        &self,
        request: Request<LambdaExistsRequest>,
    ) -> Result<Response<LambdaExistsResponse>, Status> {
        let req = request.into_inner();
        validate_identity(&req.namespace, &req.uuid, &self.validation)?;
        let exists = self
            .manager
            .exists(&Namespace::new(req.namespace), &LambdaUuid::new(req.uuid))
            .map_err(|e| error_to_status(&e))?;
        Ok(Response::new(LambdaExistsResponse { exists }))
    }

    async fn get(
        &self,
        request: Request<GetLambdaRequest>,
    ) -> Result<Response<GetLambdaResponse>, Status> {
        let req = request.into_inner();
        validate_identity(&req.namespace, &req.uuid, &self.validation)?;
        let lambda = self
            .manager
            .get(&Namespace::new(req.namespace), &LambdaUuid::new(req.uuid))
            .map_err(|e| error_to_status(&e))?;
        Ok(Response::new(GetLambdaResponse { lambda: Some(lambda.into()) }))
    }

    async fn get_bundle(
        &self,
        request: Request<GetBundleRequest>,
    ) -> Result<Response<GetBundleResponse>, Status> {
        let req = request.into_inner();
        validation::validate_bundle_hash(&req.bundle_hash, &self.validation)
            .map_err(|e| validation_status(&e))?;
        let data = self
            .manager
            .get_bundle(&BundleHash::new(req.bundle_hash))
            .map_err(|e| error_to_status(&e))?;
        Ok(Response::new(GetBundleResponse { data }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use stratus_proto::convert::ERROR_CODE_METADATA;
    use stratus_store::Database;
    use stratus_types::ErrorCode;
    use tonic::Code;

    use super::*;
    use crate::StaticNamespaces;

    fn service() -> LambdaManagerServiceImpl {
        let manager = LambdaManager::builder()
            .db(Arc::new(Database::open_in_memory()))
            .namespaces(Arc::new(StaticNamespaces::new(["acme"])))
            .build();
        LambdaManagerServiceImpl::new(Arc::new(manager))
    }

    fn create_request(namespace: &str, uuid: &str) -> CreateLambdaRequest {
        CreateLambdaRequest {
            namespace: namespace.to_string(),
            uuid: uuid.to_string(),
            runtime: "node20".to_string(),
            bundle_hash: "abc123".to_string(),
            bundle_data: b"module.exports = 1".to_vec(),
            ensure_exactly_one_delivery: true,
        }
    }

    #[tokio::test]
    async fn test_create_then_get_and_fetch_bundle() {
        let svc = service();
        let created =
            svc.create(Request::new(create_request("acme", "fn-1"))).await.unwrap().into_inner();
        assert_eq!(created.lambda.unwrap().bundle_hash, "abc123");

        let got = svc
            .get(Request::new(GetLambdaRequest {
                namespace: "acme".to_string(),
                uuid: "fn-1".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(got.lambda.unwrap().ensure_exactly_one_delivery);

        let bundle = svc
            .get_bundle(Request::new(GetBundleRequest { bundle_hash: "abc123".to_string() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(bundle.data, b"module.exports = 1");
    }

    #[tokio::test]
    async fn test_create_status_codes() {
        let svc = service();
        svc.create(Request::new(create_request("acme", "fn-1"))).await.unwrap();

        let dup = svc.create(Request::new(create_request("acme", "fn-1"))).await.unwrap_err();
        assert_eq!(dup.code(), Code::AlreadyExists);

        let missing = svc.create(Request::new(create_request("nope", "fn-1"))).await.unwrap_err();
        assert_eq!(missing.code(), Code::FailedPrecondition);

        let mut bad = create_request("acme", "fn-2");
        bad.runtime = "node 20".to_string();
        let invalid = svc.create(Request::new(bad)).await.unwrap_err();
        assert_eq!(invalid.code(), Code::InvalidArgument);
    }

    #[tokio::test]
    async fn test_domain_errors_carry_error_code_metadata() {
        let svc = service();
        let status = svc
            .get_bundle(Request::new(GetBundleRequest { bundle_hash: "missing".to_string() }))
            .await
            .unwrap_err();
        assert_eq!(status.code(), Code::NotFound);
        let code = status.metadata().get(ERROR_CODE_METADATA).unwrap().to_str().unwrap();
        assert_eq!(code, ErrorCode::NotFound.as_u16().to_string());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found_and_delete_is_idempotent() {
        let svc = service();
        let request = || GetLambdaRequest { namespace: "acme".to_string(), uuid: "x".to_string() };
        let status = svc.get(Request::new(request())).await.unwrap_err();
        assert_eq!(status.code(), Code::NotFound);

        for _ in 0..2 {
            svc.delete(Request::new(DeleteLambdaRequest {
                namespace: "acme".to_string(),
                uuid: "x".to_string(),
            }))
            .await
            .unwrap();
        }
        let exists = svc
            .exists(Request::new(LambdaExistsRequest {
                namespace: "acme".to_string(),
                uuid: "x".to_string(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert!(!exists.exists);
    }
}
