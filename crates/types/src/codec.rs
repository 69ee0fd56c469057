//! Centralized serialization and deserialization of stored records.
//!
//! Records persisted by the store are encoded with postcard, with consistent
//! error handling via snafu.

use serde::{Serialize, de::DeserializeOwned};
use snafu::Snafu;

/// Error type for codec operations.
#[derive(Debug, Snafu)]
pub enum CodecError {
    /// Encoding failed.
    #[snafu(display("Encoding failed: {source}"))]
    Encode {
        /// The underlying postcard error.
        source: postcard::Error,
    },

    /// Decoding failed.
    #[snafu(display("Decoding failed: {source}"))]
    Decode {
        /// The underlying postcard error.
        source: postcard::Error,
    },
}

/// Encodes a value to bytes using postcard serialization.
///
/// # Errors
///
/// Returns `CodecError::Encode` if serialization fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(value).map_err(|source| CodecError::Encode { source })
}

/// Decodes bytes to a value using postcard deserialization.
///
/// # Errors
///
/// Returns `CodecError::Decode` if deserialization fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|source| CodecError::Decode { source })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::types::{BundleHash, Lambda, LambdaUuid, Namespace, Runtime};

    #[test]
    fn test_lambda_record_survives_encoding() {
        let lambda = Lambda {
            namespace: Namespace::global(),
            uuid: LambdaUuid::new("thumbnail"),
            runtime: Runtime::new("python3"),
            bundle_hash: BundleHash::new("abc123"),
            ensure_exactly_one_delivery: false,
        };
        let bytes = encode(&lambda).expect("encode lambda");
        let decoded: Lambda = decode(&bytes).expect("decode lambda");
        assert_eq!(lambda, decoded);
    }

    #[test]
    fn test_decode_truncated_input_fails() {
        let bytes = encode(&"a fairly long string value".to_string()).expect("encode");
        let result: Result<String, _> = decode(&bytes[..4]);
        assert!(matches!(result, Err(CodecError::Decode { .. })));
    }

    #[test]
    fn test_decode_empty_input_fails() {
        let result: Result<u64, _> = decode(&[]);
        assert!(result.is_err());
    }
}
