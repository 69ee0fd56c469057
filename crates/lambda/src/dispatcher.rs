//! Task publishing.
//!
//! Task envelopes go to one durable direct exchange, routed by the lambda's
//! runtime, and are published persistently so they survive a broker restart
//! while no worker of that runtime is consuming.

use std::sync::Arc;

use bytes::Bytes;
use prost::Message;
use stratus_broker::{ExchangeKind, ExchangeOptions, MessageBroker, Properties};
use stratus_proto::proto::TaskEnvelope;
use stratus_types::{CorrelationToken, Lambda, Result};
use tracing::debug;

use crate::{PROTOBUF_CONTENT_TYPE, error::broker_error};

/// Where and under which token a worker should send its reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyAddress {
    /// Token pairing the reply with its caller.
    pub correlation_token: CorrelationToken,
    /// Reply queue name, used as the routing key on the response exchange.
    pub reply_to: String,
}

/// Publishes task envelopes onto the task exchange.
#[derive(Clone)]
pub struct TaskDispatcher {
    broker: Arc<dyn MessageBroker>,
    exchange: String,
}

impl TaskDispatcher {
    /// Declares the durable task exchange and returns a dispatcher for it.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Broker`](stratus_types::LambdaError::Broker) if
    /// the declaration is refused.
    pub async fn declare(
        broker: Arc<dyn MessageBroker>,
        exchange: impl Into<String>,
    ) -> Result<Self> {
        let exchange = exchange.into();
        broker
            .declare_exchange(&exchange, ExchangeKind::Direct, ExchangeOptions::durable())
            .await
            .map_err(|e| broker_error(&e))?;
        Ok(Self { broker, exchange })
    }

    /// Publishes `payload` for `lambda`, routed by its runtime.
    ///
    /// With `reply` set, the message carries the correlation id and reply-to
    /// metadata a worker needs to answer. Returns once the broker accepted
    /// the message.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Broker`](stratus_types::LambdaError::Broker) if
    /// the publish is refused.
    pub async fn publish(
        &self,
        lambda: &Lambda,
        payload: Vec<u8>,
        reply: Option<&ReplyAddress>,
    ) -> Result<()> {
        let envelope = TaskEnvelope { lambda: Some(lambda.into()), payload };
        let mut properties = Properties::persistent(PROTOBUF_CONTENT_TYPE);
        if let Some(reply) = reply {
            properties = properties
                .with_correlation_id(reply.correlation_token.as_str())
                .with_reply_to(reply.reply_to.as_str());
        }

        self.broker
            .publish(
                &self.exchange,
                lambda.runtime.as_str(),
                Bytes::from(envelope.encode_to_vec()),
                properties,
            )
            .await
            .map_err(|e| broker_error(&e))?;

        debug!(
            exchange = %self.exchange,
            runtime = %lambda.runtime,
            correlation_id = reply.map(|r| r.correlation_token.as_str()),
            "Task published"
        );
        Ok(())
    }

    /// Name of the task exchange.
    pub fn exchange(&self) -> &str {
        &self.exchange
    }
}

impl std::fmt::Debug for TaskDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskDispatcher").field("exchange", &self.exchange).finish_non_exhaustive()
    }
}
