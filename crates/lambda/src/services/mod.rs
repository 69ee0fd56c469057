//! gRPC service implementations for the Stratus lambda subsystem.
//!
//! Each service validates identifiers at the boundary, delegates to the
//! domain type it wraps and maps [`LambdaError`](stratus_types::LambdaError)
//! into a `tonic::Status` carrying the numeric error code as metadata.

mod entrypoint;
mod helpers;
mod manager;
mod namespace;

pub use entrypoint::LambdaEntrypointServiceImpl;
pub use manager::LambdaManagerServiceImpl;
pub use namespace::NamespaceServiceImpl;
