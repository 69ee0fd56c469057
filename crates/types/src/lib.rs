//! Core types, errors, and configuration for the Stratus lambda subsystem.
//!
//! This crate provides the foundational types shared by every other crate:
//! - Identifier newtypes ([`Namespace`], [`LambdaUuid`], [`Runtime`], [`BundleHash`],
//!   [`CorrelationToken`])
//! - The persisted records ([`Lambda`], [`Bundle`])
//! - The error taxonomy ([`LambdaError`], [`ErrorCode`]) using snafu
//! - SHA-256 helpers for bundle hash verification
//! - Validated configuration structs

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod codec;
pub mod config;
pub mod error;
pub mod hash;
pub mod types;
pub mod validation;

// Re-export commonly used types at crate root
pub use error::{ErrorCode, LambdaError, Result};
pub use hash::{Sha256Digest, sha256, sha256_hex};
pub use types::*;
