//! Input validation for RPC request fields.
//!
//! Used at the gRPC service boundary before a request reaches the manager or
//! the entrypoint.
//!
//! ## Character Whitelists
//!
//! - Namespaces: `[a-z0-9-]`, no leading/trailing hyphen; empty means global.
//! - Lambda uuids: `[a-zA-Z0-9:_.-]`.
//! - Runtimes: `[a-zA-Z0-9_.-]`, safe as a broker routing key.
//! - Bundle hashes: `[a-zA-Z0-9:_-]`.

use std::fmt;

use crate::config::ValidationConfig;

/// Validation error with structured context.
///
/// Contains the specific constraint that was violated and the field name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// The field that failed validation.
    pub field: String,
    /// Description of the violated constraint.
    pub constraint: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.constraint)
    }
}

impl std::error::Error for ValidationError {}

/// Validates a namespace name.
///
/// The empty string is the global namespace and is always valid.
///
/// # Errors
///
/// Returns [`ValidationError`] if the name exceeds `max_namespace_bytes`,
/// starts or ends with a hyphen, or contains characters outside `[a-z0-9-]`.
pub fn validate_namespace(name: &str, config: &ValidationConfig) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Ok(());
    }
    check_length("namespace", name, config.max_namespace_bytes)?;
    if name.starts_with('-') || name.ends_with('-') {
        return Err(ValidationError {
            field: "namespace".to_string(),
            constraint: "must not start or end with a hyphen".to_string(),
        });
    }
    check_charset("namespace", name, is_namespace_char, "[a-z0-9-]")
}

/// Validates a lambda uuid.
///
/// # Errors
///
/// Returns [`ValidationError`] if the uuid is empty, too long, or contains
/// characters outside `[a-zA-Z0-9:_.-]`.
pub fn validate_uuid(uuid: &str, config: &ValidationConfig) -> Result<(), ValidationError> {
    check_non_empty("uuid", uuid)?;
    check_length("uuid", uuid, config.max_uuid_bytes)?;
    check_charset("uuid", uuid, is_uuid_char, "[a-zA-Z0-9:_.-]")
}

/// Validates a runtime tag.
///
/// # Errors
///
/// Returns [`ValidationError`] if the runtime is empty, too long, or contains
/// characters outside `[a-zA-Z0-9_.-]`.
pub fn validate_runtime(runtime: &str, config: &ValidationConfig) -> Result<(), ValidationError> {
    check_non_empty("runtime", runtime)?;
    check_length("runtime", runtime, config.max_runtime_bytes)?;
    check_charset("runtime", runtime, is_runtime_char, "[a-zA-Z0-9_.-]")
}

/// Validates a bundle hash.
///
/// # Errors
///
/// Returns [`ValidationError`] if the hash is empty, too long, or contains
/// characters outside `[a-zA-Z0-9:_-]`.
pub fn validate_bundle_hash(hash: &str, config: &ValidationConfig) -> Result<(), ValidationError> {
    check_non_empty("bundle_hash", hash)?;
    check_length("bundle_hash", hash, config.max_bundle_hash_bytes)?;
    check_charset("bundle_hash", hash, is_hash_char, "[a-zA-Z0-9:_-]")
}

/// Validates an invocation payload size.
///
/// # Errors
///
/// Returns [`ValidationError`] if the payload exceeds `max_payload_bytes`.
pub fn validate_payload(payload: &[u8], config: &ValidationConfig) -> Result<(), ValidationError> {
    if payload.len() > config.max_payload_bytes {
        return Err(ValidationError {
            field: "payload".to_string(),
            constraint: format!(
                "length {} bytes exceeds maximum {} bytes",
                payload.len(),
                config.max_payload_bytes
            ),
        });
    }
    Ok(())
}

fn check_non_empty(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError {
            field: field.to_string(),
            constraint: "must not be empty".to_string(),
        });
    }
    Ok(())
}

fn check_length(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.len() > max {
        return Err(ValidationError {
            field: field.to_string(),
            constraint: format!("length {} bytes exceeds maximum {} bytes", value.len(), max),
        });
    }
    Ok(())
}

fn check_charset(
    field: &str,
    value: &str,
    allowed: fn(char) -> bool,
    description: &str,
) -> Result<(), ValidationError> {
    if let Some(pos) = value.find(|c: char| !allowed(c)) {
        return Err(ValidationError {
            field: field.to_string(),
            constraint: format!(
                "contains invalid character {:?} at byte offset {}; allowed: {}",
                value[pos..].chars().next().unwrap_or('\0'),
                pos,
                description
            ),
        });
    }
    Ok(())
}

fn is_namespace_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-'
}

fn is_uuid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '.' | '-')
}

fn is_runtime_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_hash_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ':' | '_' | '-')
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn default_config() -> ValidationConfig {
        ValidationConfig::default()
    }

    // =========================================================================
    // validate_namespace tests
    // =========================================================================

    #[test]
    fn test_validate_namespace_global() {
        assert!(validate_namespace("", &default_config()).is_ok());
    }

    #[test]
    fn test_validate_namespace_valid() {
        assert!(validate_namespace("acme-prod-01", &default_config()).is_ok());
    }

    #[test]
    fn test_validate_namespace_uppercase() {
        let err = validate_namespace("Acme", &default_config()).unwrap_err();
        assert_eq!(err.field, "namespace");
        assert!(err.constraint.contains("invalid character"));
    }

    #[test]
    fn test_validate_namespace_hyphen_edges() {
        assert!(validate_namespace("-acme", &default_config()).is_err());
        assert!(validate_namespace("acme-", &default_config()).is_err());
    }

    #[test]
    fn test_validate_namespace_too_long() {
        let config = ValidationConfig { max_namespace_bytes: 4, ..ValidationConfig::default() };
        assert!(validate_namespace("abcd", &config).is_ok());
        let err = validate_namespace("abcde", &config).unwrap_err();
        assert!(err.constraint.contains("exceeds maximum"));
    }

    // =========================================================================
    // validate_uuid / validate_runtime / validate_bundle_hash tests
    // =========================================================================

    #[test]
    fn test_validate_uuid_accepts_hyphenated_uuid() {
        assert!(validate_uuid("6f1c1d2e-8a4b-4c3d-9e5f-0a1b2c3d4e5f", &default_config()).is_ok());
    }

    #[test]
    fn test_validate_uuid_empty() {
        let err = validate_uuid("", &default_config()).unwrap_err();
        assert_eq!(err.field, "uuid");
        assert!(err.constraint.contains("empty"));
    }

    #[test]
    fn test_validate_uuid_rejects_slash() {
        assert!(validate_uuid("a/b", &default_config()).is_err());
    }

    #[test]
    fn test_validate_runtime_rejects_routing_wildcards() {
        assert!(validate_runtime("python3.12", &default_config()).is_ok());
        assert!(validate_runtime("node.*", &default_config()).is_err());
        assert!(validate_runtime("node#", &default_config()).is_err());
    }

    #[test]
    fn test_validate_bundle_hash() {
        assert!(validate_bundle_hash("sha256:abcdef0123", &default_config()).is_ok());
        assert!(validate_bundle_hash("", &default_config()).is_err());
        assert!(validate_bundle_hash("abc def", &default_config()).is_err());
    }

    // =========================================================================
    // validate_payload tests
    // =========================================================================

    #[test]
    fn test_validate_payload_at_limit() {
        let config = ValidationConfig { max_payload_bytes: 8, ..ValidationConfig::default() };
        assert!(validate_payload(&[0u8; 8], &config).is_ok());
        let err = validate_payload(&[0u8; 9], &config).unwrap_err();
        assert_eq!(err.field, "payload");
    }
}
