//! Shared request validation for the lambda services.

use stratus_types::{
    config::ValidationConfig,
    validation::{self, ValidationError},
};
use tonic::Status;

/// Converts a validation failure into `INVALID_ARGUMENT`.
pub(crate) fn validation_status(err: &ValidationError) -> Status {
    Status::invalid_argument(err.to_string())
}

/// Validates the `(namespace, uuid)` pair addressing a lambda.
pub(crate) fn validate_identity(
    namespace: &str,
    uuid: &str,
    config: &ValidationConfig,
) -> Result<(), Status> {
    validation::validate_namespace(namespace, config).map_err(|e| validation_status(&e))?;
    validation::validate_uuid(uuid, config).map_err(|e| validation_status(&e))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use tonic::Code;

    use super::*;

    #[test]
    fn test_identity_accepts_global_namespace() {
        validate_identity("", "fn-1", &ValidationConfig::default()).unwrap();
    }

    #[test]
    fn test_identity_rejects_bad_fields_with_field_name() {
        let config = ValidationConfig::default();

        let status = validate_identity("Acme", "fn-1", &config).unwrap_err();
        assert_eq!(status.code(), Code::InvalidArgument);
        assert!(status.message().starts_with("namespace:"));

        let status = validate_identity("acme", "", &config).unwrap_err();
        assert!(status.message().starts_with("uuid:"));
    }
}
