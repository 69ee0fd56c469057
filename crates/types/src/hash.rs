//! SHA-256 helpers for bundle content addressing.
//!
//! Bundle hashes are caller-supplied. When the `verify_sha256` hash policy is
//! active, the manager recomputes the digest of the uploaded bytes and compares
//! it against the supplied hash with [`matches_hex_digest`].

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// SHA-256 digest output (32 bytes).
pub type Sha256Digest = [u8; 32];

/// Compute SHA-256 hash of arbitrary data.
#[inline]
pub fn sha256(data: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Compute the lowercase hex SHA-256 of arbitrary data.
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256(data))
}

/// Whether `expected_hex` is the hex SHA-256 digest of `data`.
///
/// Accepts upper- or lowercase hex. Comparison of the decoded digest is
/// constant-time.
pub fn matches_hex_digest(expected_hex: &str, data: &[u8]) -> bool {
    let Ok(expected) = hex::decode(expected_hex) else {
        return false;
    };
    if expected.len() != 32 {
        return false;
    }
    let actual = sha256(data);
    actual.as_slice().ct_eq(expected.as_slice()).into()
}
