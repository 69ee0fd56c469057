//! Protobuf types and conversions for the Stratus lambda subsystem.
//!
//! This crate provides:
//! - Generated protobuf types and gRPC service traits ([`proto`])
//! - Conversions between domain types, errors and proto types ([`convert`])
//!
//! Worker processes only need the wire messages ([`proto::TaskEnvelope`],
//! [`proto::TaskResult`]) and can depend on this crate alone.

#![deny(unsafe_code)]
// gRPC services return tonic::Status (176 bytes) - standard practice for gRPC error handling
#![allow(clippy::result_large_err)]

/// Generated protobuf types and service traits.
pub mod proto {
    #![allow(clippy::all)]
    #![allow(missing_docs)]

    #[cfg(use_pregenerated_proto)]
    include!("generated/stratus.lambda.v1.rs");

    #[cfg(not(use_pregenerated_proto))]
    tonic::include_proto!("stratus.lambda.v1");
}

/// Conversions between domain and protobuf types.
pub mod convert;
