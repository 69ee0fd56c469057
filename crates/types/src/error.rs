//! Error types for the lambda subsystem using snafu.
//!
//! Defines the error taxonomy shared by the manager and the entrypoint:
//! - Entity errors (not found, already exists)
//! - Precondition errors (namespace missing)
//! - Dispatch errors (deadline exceeded, worker-reported status)
//! - Infrastructure errors (storage, broker, serialization)
//!
//! Each error variant maps to an [`ErrorCode`] with a unique numeric identifier
//! and a retryability classification.

use core::fmt;

use snafu::{Location, Snafu};

use crate::types::{LambdaUuid, Namespace};

/// Unified result type for lambda operations.
pub type Result<T, E = LambdaError> = std::result::Result<T, E>;

/// Machine-readable error codes for programmatic error handling.
///
/// | Range       | Domain         | Examples                                   |
/// |-------------|----------------|--------------------------------------------|
/// | 1000–1099   | Infrastructure | Storage, broker, serialization             |
/// | 3000–3099   | Application    | Not found, already exists, precondition    |
/// | 3100–3199   | Dispatch       | Deadline exceeded, worker-reported failure |
/// | 3200–3299   | Request        | Invalid argument, internal                 |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Storage transaction or table operation failed.
    Storage = 1000,
    /// Broker publish, declare, or consume failed.
    Broker = 1001,
    /// Encoding or decoding a stored record or wire message failed.
    Serialization = 1002,
    /// Lambda or bundle not found.
    NotFound = 3000,
    /// Lambda uuid already used in the namespace.
    AlreadyExists = 3001,
    /// Namespace does not exist.
    FailedPrecondition = 3002,
    /// Synchronous execution timed out waiting for a reply.
    DeadlineExceeded = 3100,
    /// Worker answered with a non-success status.
    Worker = 3101,
    /// Malformed request parameter.
    InvalidArgument = 3200,
    /// Unexpected state or invariant violation.
    Internal = 3201,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Storage),
            1001 => Some(Self::Broker),
            1002 => Some(Self::Serialization),
            3000 => Some(Self::NotFound),
            3001 => Some(Self::AlreadyExists),
            3002 => Some(Self::FailedPrecondition),
            3100 => Some(Self::DeadlineExceeded),
            3101 => Some(Self::Worker),
            3200 => Some(Self::InvalidArgument),
            3201 => Some(Self::Internal),
            _ => None,
        }
    }

    /// Whether this error is retryable by the caller.
    ///
    /// Nothing in this subsystem retries automatically on behalf of a caller
    /// except transient storage conflicts, which never surface as a code.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Storage | Self::Broker | Self::DeadlineExceeded)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Top-level error type for lambda operations.
///
/// Callers must be able to tell "lambda does not exist" ([`NotFound`]) from
/// "lambda did not answer in time" ([`DeadlineExceeded`]) from "lambda answered
/// with an error" ([`Worker`]).
///
/// [`NotFound`]: LambdaError::NotFound
/// [`DeadlineExceeded`]: LambdaError::DeadlineExceeded
/// [`Worker`]: LambdaError::Worker
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum LambdaError {
    /// Entity absent.
    #[snafu(display("{entity} not found: {key}"))]
    NotFound {
        /// Kind of entity ("lambda", "bundle").
        entity: &'static str,
        /// Human-readable key of the missing entity.
        key: String,
    },

    /// A lambda with the same uuid already exists in the namespace.
    #[snafu(display("Lambda {uuid} already exists in namespace {namespace:?}"))]
    AlreadyExists {
        /// Namespace of the conflicting record.
        namespace: Namespace,
        /// Conflicting uuid.
        uuid: LambdaUuid,
    },

    /// Namespace missing or another precondition not met.
    #[snafu(display("Failed precondition: {message}"))]
    FailedPrecondition {
        /// Error description.
        message: String,
    },

    /// Synchronous execution did not receive a reply within its bound.
    #[snafu(display("No reply within {timeout_ms}ms"))]
    DeadlineExceeded {
        /// Bound that elapsed, in milliseconds.
        timeout_ms: u64,
    },

    /// Worker answered with a non-success status, passed through verbatim.
    #[snafu(display("Worker reported status {code}: {message}"))]
    Worker {
        /// RPC status code reported by the worker.
        code: i32,
        /// Worker-supplied message.
        message: String,
    },

    /// Malformed request parameter.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// Error description.
        message: String,
    },

    /// Storage failure, including transient conflicts after retries ran out.
    #[snafu(display("Storage error at {location}: {message}"))]
    Storage {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Broker transport failure.
    #[snafu(display("Broker error at {location}: {message}"))]
    Broker {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Record or wire message could not be encoded or decoded.
    #[snafu(display("Serialization error at {location}: {message}"))]
    Serialization {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },

    /// Unexpected state or remote transport failure.
    #[snafu(display("Internal error at {location}: {message}"))]
    Internal {
        /// Error description.
        message: String,
        /// Source location.
        #[snafu(implicit)]
        location: Location,
    },
}

impl LambdaError {
    /// Returns the machine-readable error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::NotFound { .. } => ErrorCode::NotFound,
            Self::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            Self::FailedPrecondition { .. } => ErrorCode::FailedPrecondition,
            Self::DeadlineExceeded { .. } => ErrorCode::DeadlineExceeded,
            Self::Worker { .. } => ErrorCode::Worker,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::Storage { .. } => ErrorCode::Storage,
            Self::Broker { .. } => ErrorCode::Broker,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::Internal { .. } => ErrorCode::Internal,
        }
    }

    /// Whether this error is retryable.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        self.code().is_retryable()
    }

    /// Shorthand for a missing lambda.
    pub fn lambda_not_found(namespace: &Namespace, uuid: &LambdaUuid) -> Self {
        Self::NotFound { entity: "lambda", key: format!("{namespace}/{uuid}") }
    }

    /// Shorthand for a missing bundle.
    pub fn bundle_not_found(hash: impl fmt::Display) -> Self {
        Self::NotFound { entity: "bundle", key: hash.to_string() }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_roundtrip() {
        for code in [
            ErrorCode::Storage,
            ErrorCode::Broker,
            ErrorCode::Serialization,
            ErrorCode::NotFound,
            ErrorCode::AlreadyExists,
            ErrorCode::FailedPrecondition,
            ErrorCode::DeadlineExceeded,
            ErrorCode::Worker,
            ErrorCode::InvalidArgument,
            ErrorCode::Internal,
        ] {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(code));
        }
        assert_eq!(ErrorCode::from_u16(42), None);
    }

    #[test]
    fn test_not_found_display() {
        let err = LambdaError::lambda_not_found(&Namespace::new("acme"), &LambdaUuid::new("l1"));
        assert_eq!(err.to_string(), "lambda not found: acme/l1");
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_storage_error_captures_location() {
        let err = StorageSnafu { message: "conflict" }.build();
        let display = err.to_string();
        assert!(display.contains("error.rs"), "display should include location: {display}");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_dispatch_errors_are_distinguishable() {
        let timeout = LambdaError::DeadlineExceeded { timeout_ms: 50 };
        let worker = LambdaError::Worker { code: 13, message: "boom".to_string() };
        let missing = LambdaError::bundle_not_found("h1");
        assert_eq!(timeout.code(), ErrorCode::DeadlineExceeded);
        assert_eq!(worker.code(), ErrorCode::Worker);
        assert_eq!(missing.code(), ErrorCode::NotFound);
        assert_eq!(worker.to_string(), "Worker reported status 13: boom");
    }
}
