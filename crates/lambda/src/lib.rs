//! Lambda directory, bundle storage and task dispatch.
//!
//! This crate is the core of the Stratus lambda subsystem:
//!
//! - [`LambdaManager`]: namespace-scoped lambda records kept consistent with a global,
//!   content-addressed and reference-counted bundle store inside one retried transaction.
//! - [`Entrypoint`]: turns an invocation into a durable task publish (`call`) or a
//!   request/response exchange with a bounded wait (`execute`).
//! - [`CorrelationRouter`]: the single consumption loop that hands replies from this
//!   process's private reply queue to the caller waiting on their correlation token.
//! - [`worker`]: the worker-side half of the protocol (decode a task, publish a result).
//! - [`LambdaServer`]: gRPC assembly of the manager, entrypoint and namespace services.
//!
//! ## Dispatch overview
//!
//! ```text
//!  Execute ──► resolve ──► register waiter ──► publish(task exchange, key = runtime)
//!                                                   │
//!                                               worker pool
//!                                                   │
//!  result ◄── waiter ◄── CorrelationRouter ◄── publish(response exchange, key = reply queue)
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// tonic::Status is inherently large; every gRPC handler returns it.
#![allow(clippy::result_large_err)]

pub mod bundle;
pub mod directory;
pub mod dispatcher;
pub mod entrypoint;
mod error;
pub mod manager;
pub mod metrics;
pub mod namespace;
pub mod resolver;
pub mod router;
pub mod server;
pub mod services;
pub mod worker;

pub use dispatcher::{ReplyAddress, TaskDispatcher};
pub use entrypoint::Entrypoint;
pub use manager::LambdaManager;
pub use namespace::{
    CachedNamespaceDirectory, GrpcNamespaceDirectory, NamespaceDirectory, StaticNamespaces,
};
pub use resolver::{LambdaResolver, ManagerClient};
pub use router::{CorrelationRouter, Waiter};
pub use server::LambdaServer;

/// Content type of task envelopes and task results on the broker.
pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";
