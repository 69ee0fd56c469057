//! Broker error types.

use snafu::Snafu;

/// Result type alias for broker operations.
pub type Result<T, E = BrokerError> = std::result::Result<T, E>;

/// Errors returned by [`MessageBroker`](crate::MessageBroker) operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum BrokerError {
    /// The named exchange has not been declared.
    #[snafu(display("Exchange {name:?} not found"))]
    ExchangeNotFound {
        /// Exchange name.
        name: String,
    },

    /// The named queue does not exist.
    #[snafu(display("Queue {name:?} not found"))]
    QueueNotFound {
        /// Queue name.
        name: String,
    },

    /// An exclusive queue already has a consumer.
    #[snafu(display("Queue {name:?} is exclusive and already consumed"))]
    ExclusiveQueueInUse {
        /// Queue name.
        name: String,
    },

    /// Redeclaration with settings different from the existing entity.
    #[snafu(display("Precondition failed: {message}"))]
    PreconditionFailed {
        /// Error description.
        message: String,
    },

    /// The broker connection is closed.
    #[snafu(display("Broker connection closed"))]
    Closed,
}
