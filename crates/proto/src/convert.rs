//! Conversions between domain types and protobuf types.
//!
//! Errors cross the RPC boundary as `tonic::Status`. The numeric
//! [`ErrorCode`] is attached as `x-error-code` metadata so the client side can
//! restore variants that share a gRPC code (a worker-reported `INTERNAL` vs. a
//! storage failure, for instance).

use stratus_types::{
    BundleHash, ErrorCode, Lambda, LambdaError, LambdaUuid, Namespace, Runtime,
    error::{BrokerSnafu, InternalSnafu, SerializationSnafu, StorageSnafu},
};
use tonic::{Code, Status, metadata::MetadataValue};

use crate::proto;

/// Metadata key carrying the numeric [`ErrorCode`] of a failed call.
pub const ERROR_CODE_METADATA: &str = "x-error-code";

// ============================================================================
// Records
// ============================================================================

impl From<Lambda> for proto::Lambda {
    fn from(lambda: Lambda) -> Self {
        Self {
            namespace: lambda.namespace.into_inner(),
            uuid: lambda.uuid.into_inner(),
            runtime: lambda.runtime.into_inner(),
            bundle_hash: lambda.bundle_hash.into_inner(),
            ensure_exactly_one_delivery: lambda.ensure_exactly_one_delivery,
        }
    }
}

impl From<proto::Lambda> for Lambda {
    fn from(lambda: proto::Lambda) -> Self {
        Self {
            namespace: Namespace::new(lambda.namespace),
            uuid: LambdaUuid::new(lambda.uuid),
            runtime: Runtime::new(lambda.runtime),
            bundle_hash: BundleHash::new(lambda.bundle_hash),
            ensure_exactly_one_delivery: lambda.ensure_exactly_one_delivery,
        }
    }
}

impl From<&Lambda> for proto::LambdaReference {
    fn from(lambda: &Lambda) -> Self {
        Self {
            namespace: lambda.namespace.as_str().to_owned(),
            uuid: lambda.uuid.as_str().to_owned(),
            bundle_hash: lambda.bundle_hash.as_str().to_owned(),
            ensure_exactly_one_delivery: lambda.ensure_exactly_one_delivery,
        }
    }
}

/// Extracts the lambda from a response that must carry one.
///
/// # Errors
///
/// Returns [`LambdaError::Internal`] if the field is absent.
pub fn required_lambda(lambda: Option<proto::Lambda>) -> Result<Lambda, LambdaError> {
    match lambda {
        Some(lambda) => Ok(lambda.into()),
        None => InternalSnafu { message: "response is missing the lambda field" }.fail(),
    }
}

// ============================================================================
// Task results
// ============================================================================

impl proto::TaskResult {
    /// Successful result carrying `payload`.
    pub fn success(payload: Vec<u8>) -> Self {
        Self { status_code: Code::Ok as i32, message: String::new(), payload }
    }

    /// Failed result with a gRPC status code and message.
    pub fn failure(code: Code, message: impl Into<String>) -> Self {
        Self { status_code: code as i32, message: message.into(), payload: Vec::new() }
    }

    /// Converts the result into the payload or the worker's error, verbatim.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Worker`] when `status_code` is not success.
    pub fn into_payload(self) -> Result<Vec<u8>, LambdaError> {
        if self.status_code == Code::Ok as i32 {
            Ok(self.payload)
        } else {
            Err(LambdaError::Worker { code: self.status_code, message: self.message })
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Converts a domain error into a gRPC status.
pub fn error_to_status(err: &LambdaError) -> Status {
    let mut status = match err {
        LambdaError::NotFound { .. } => Status::not_found(err.to_string()),
        LambdaError::AlreadyExists { .. } => Status::already_exists(err.to_string()),
        LambdaError::FailedPrecondition { message } => Status::failed_precondition(message.clone()),
        LambdaError::DeadlineExceeded { .. } => Status::deadline_exceeded(err.to_string()),
        LambdaError::InvalidArgument { message } => Status::invalid_argument(message.clone()),
        LambdaError::Worker { code, message } => worker_status(*code, message),
        LambdaError::Storage { .. }
        | LambdaError::Broker { .. }
        | LambdaError::Serialization { .. }
        | LambdaError::Internal { .. } => Status::internal(err.to_string()),
    };
    status.metadata_mut().insert(ERROR_CODE_METADATA, MetadataValue::from(err.code().as_u16()));
    status
}

fn worker_status(code: i32, message: &str) -> Status {
    // A worker may report a code outside the gRPC space; keep it visible.
    let grpc = Code::from_i32(code);
    if grpc == Code::Unknown && code != Code::Unknown as i32 {
        return Status::unknown(format!("worker status {code}: {message}"));
    }
    Status::new(grpc, message.to_owned())
}

fn error_code_of(status: &Status) -> Option<ErrorCode> {
    status
        .metadata()
        .get(ERROR_CODE_METADATA)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u16>().ok())
        .and_then(ErrorCode::from_u16)
}

/// Converts a gRPC status received from a remote service into a domain error.
///
/// `ALREADY_EXISTS` carries no structured identity on the wire, so the
/// returned variant has an empty namespace and uuid; callers that know the
/// conflicting `(namespace, uuid)` should use [`already_exists`] instead.
pub fn status_to_error(status: &Status) -> LambdaError {
    let message = status.message().to_owned();
    match error_code_of(status) {
        Some(ErrorCode::Worker) => {
            return LambdaError::Worker { code: status.code() as i32, message };
        }
        Some(ErrorCode::Storage) => return StorageSnafu { message }.build(),
        Some(ErrorCode::Broker) => return BrokerSnafu { message }.build(),
        Some(ErrorCode::Serialization) => return SerializationSnafu { message }.build(),
        _ => {}
    }
    match status.code() {
        Code::NotFound => LambdaError::NotFound { entity: "remote", key: message },
        Code::FailedPrecondition => LambdaError::FailedPrecondition { message },
        Code::AlreadyExists => LambdaError::AlreadyExists {
            namespace: Namespace::new(String::new()),
            uuid: LambdaUuid::new(String::new()),
        },
        Code::DeadlineExceeded => LambdaError::DeadlineExceeded { timeout_ms: 0 },
        Code::InvalidArgument => LambdaError::InvalidArgument { message },
        Code::Unavailable => {
            BrokerSnafu { message: format!("remote unavailable: {message}") }.build()
        },
        code => {
            InternalSnafu { message: format!("remote call failed ({code:?}): {message}") }.build()
        },
    }
}

/// Converts a status from `Create`, restoring `AlreadyExists` with its identity.
pub fn already_exists(status: &Status, namespace: &Namespace, uuid: &LambdaUuid) -> LambdaError {
    if status.code() == Code::AlreadyExists {
        return LambdaError::AlreadyExists { namespace: namespace.clone(), uuid: uuid.clone() };
    }
    status_to_error(status)
}
