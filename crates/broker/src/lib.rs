//! Message broker abstraction for the Stratus lambda subsystem.
//!
//! The [`MessageBroker`] trait covers the AMQP-style subset the lambda
//! dispatch protocol relies on:
//!
//! - direct exchanges routing by exact routing key
//! - durable, exclusive, auto-delete and server-named queues
//! - publish with correlation-id / reply-to / persistence metadata
//! - consumers that detach when dropped
//!
//! [`InMemoryBroker`] implements it in-process. It is used by tests and by
//! single-process deployments where workers run alongside the entrypoint.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use bytes::Bytes;

pub use error::{BrokerError, Result};
pub use memory::InMemoryBroker;
pub use types::{
    Consumer, DeliveryMode, Delivery, ExchangeKind, ExchangeOptions, Properties, QueueOptions,
};

/// Broker operations used by the dispatcher, the correlation router and workers.
///
/// Implementations must tolerate concurrent use from many tasks.
#[async_trait]
pub trait MessageBroker: Send + Sync + 'static {
    /// Declares an exchange. Redeclaring with identical settings is a no-op.
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<()>;

    /// Declares a queue and returns its name.
    ///
    /// An empty `name` asks the broker to generate a unique one.
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<String>;

    /// Binds `queue` to `exchange` under `routing_key`.
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Publishes a message.
    ///
    /// Returns once the broker accepted the message. A message no queue is
    /// bound for is dropped, as AMQP does for non-mandatory publishes.
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        properties: Properties,
    ) -> Result<()>;

    /// Starts consuming `queue`. Dropping the returned [`Consumer`] cancels it.
    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Consumer>;

    /// Deletes a queue and its bindings. Deleting an absent queue is a no-op.
    async fn delete_queue(&self, queue: &str) -> Result<()>;
}
