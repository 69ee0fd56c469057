//! Exchange, queue, message and consumer types.

use std::fmt;

use bytes::Bytes;
use tokio::sync::mpsc;

/// Exchange routing behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Route to queues bound with a routing key equal to the message's.
    Direct,
    /// Route to every bound queue, ignoring the routing key.
    Fanout,
}

/// Exchange declaration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Survives a broker restart.
    pub durable: bool,
}

impl ExchangeOptions {
    /// Options for a durable exchange.
    pub const fn durable() -> Self {
        Self { durable: true }
    }
}

/// Queue declaration options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    /// Survives a broker restart.
    pub durable: bool,
    /// Usable by a single consumer only.
    pub exclusive: bool,
    /// Deleted once its last consumer is cancelled.
    pub auto_delete: bool,
}

impl QueueOptions {
    /// A durable, shared queue such as a worker pool's task queue.
    pub const fn durable() -> Self {
        Self { durable: true, exclusive: false, auto_delete: false }
    }

    /// A private reply queue: exclusive and deleted with its consumer.
    pub const fn reply() -> Self {
        Self { durable: false, exclusive: true, auto_delete: true }
    }
}

/// Whether a message should survive a broker restart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Kept in memory only.
    #[default]
    Transient,
    /// Written to disk by brokers that persist.
    Persistent,
}

/// Message metadata carried outside the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Properties {
    /// Token pairing a request with its reply.
    pub correlation_id: Option<String>,
    /// Routing key the reply should be published under.
    pub reply_to: Option<String>,
    /// Persistence of the message.
    pub delivery_mode: DeliveryMode,
    /// MIME type of the body.
    pub content_type: Option<String>,
}

impl Properties {
    /// Persistent properties with the given content type.
    pub fn persistent(content_type: &str) -> Self {
        Self {
            delivery_mode: DeliveryMode::Persistent,
            content_type: Some(content_type.to_owned()),
            ..Self::default()
        }
    }

    /// Sets the correlation id.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets the reply-to address.
    #[must_use]
    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }
}

/// A message handed to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Broker-assigned, monotonically increasing tag.
    pub delivery_tag: u64,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message was published with.
    pub routing_key: String,
    /// Message body.
    pub body: Bytes,
    /// Message metadata.
    pub properties: Properties,
}

/// Cancels a consumer on the broker side.
pub type CancelHook = Box<dyn FnOnce() + Send + Sync>;

/// Receiving end of a queue subscription.
///
/// Dropping the consumer cancels the subscription; auto-delete queues are
/// removed once their last consumer is gone.
pub struct Consumer {
    tag: String,
    queue: String,
    receiver: mpsc::UnboundedReceiver<Delivery>,
    on_cancel: Option<CancelHook>,
}

impl Consumer {
    /// Creates a consumer. `on_cancel` runs exactly once, on drop.
    pub fn new(
        tag: impl Into<String>,
        queue: impl Into<String>,
        receiver: mpsc::UnboundedReceiver<Delivery>,
        on_cancel: CancelHook,
    ) -> Self {
        Self { tag: tag.into(), queue: queue.into(), receiver, on_cancel: Some(on_cancel) }
    }

    /// Waits for the next delivery.
    ///
    /// Returns `None` once the broker closed the subscription.
    pub async fn next(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }

    /// Consumer tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Queue being consumed.
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Cancels the subscription.
    pub fn cancel(self) {}
}

impl Drop for Consumer {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(on_cancel) = self.on_cancel.take() {
            on_cancel();
        }
    }
}

impl fmt::Debug for Consumer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer").field("tag", &self.tag).field("queue", &self.queue).finish()
    }
}
