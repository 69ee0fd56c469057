//! Worker-side half of the dispatch protocol.
//!
//! A worker pool owns one durable queue per runtime, bound to the task
//! exchange under the runtime name. For each delivery it decodes a
//! [`TaskRequest`], runs the lambda (outside this crate), and answers with
//! [`reply`] when the caller asked for a result.

use bytes::Bytes;
use prost::Message;
use stratus_broker::{Delivery, MessageBroker, Properties, QueueOptions};
use stratus_proto::proto::{TaskEnvelope, TaskResult};
use stratus_types::{
    CorrelationToken, Result, Runtime,
    error::{InvalidArgumentSnafu, SerializationSnafu},
};
use tracing::{debug, trace};

use crate::{PROTOBUF_CONTENT_TYPE, error::broker_error};

/// A decoded task delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    /// Lambda reference and caller payload.
    pub envelope: TaskEnvelope,
    /// Runtime the task was routed by.
    pub runtime: Runtime,
    /// Token to echo in the reply. `None` for fire-and-forget calls.
    pub correlation_token: Option<CorrelationToken>,
    /// Routing key for the reply on the response exchange.
    pub reply_to: Option<String>,
}

impl TaskRequest {
    /// Decodes a task delivery.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Serialization`](stratus_types::LambdaError::Serialization)
    /// if the body is not a task envelope.
    pub fn decode(delivery: &Delivery) -> Result<Self> {
        let envelope = TaskEnvelope::decode(delivery.body.clone()).map_err(|e| {
            SerializationSnafu { message: format!("task envelope: {e}") }.build()
        })?;
        Ok(Self {
            envelope,
            runtime: Runtime::new(delivery.routing_key.as_str()),
            correlation_token: delivery
                .properties
                .correlation_id
                .as_deref()
                .map(CorrelationToken::new),
            reply_to: delivery.properties.reply_to.clone(),
        })
    }

    /// Whether the caller waits for a result.
    pub fn expects_reply(&self) -> bool {
        self.correlation_token.is_some() && self.reply_to.is_some()
    }
}

/// Declares the durable queue of a runtime's worker pool and binds it to the
/// task exchange. Returns the queue name.
///
/// # Errors
///
/// Returns [`LambdaError::Broker`](stratus_types::LambdaError::Broker) if the
/// task exchange is missing or the declaration is refused.
pub async fn declare_worker_queue(
    broker: &dyn MessageBroker,
    task_exchange: &str,
    runtime: &Runtime,
) -> Result<String> {
    let queue = broker
        .declare_queue(runtime.as_str(), QueueOptions::durable())
        .await
        .map_err(|e| broker_error(&e))?;
    broker
        .bind_queue(&queue, task_exchange, runtime.as_str())
        .await
        .map_err(|e| broker_error(&e))?;
    debug!(queue = %queue, exchange = task_exchange, "Worker queue ready");
    Ok(queue)
}

/// Publishes `result` back to the caller of `task`.
///
/// Returns `false` without publishing when the task was fire-and-forget.
///
/// # Errors
///
/// Returns [`LambdaError::Broker`](stratus_types::LambdaError::Broker) if the
/// publish is refused.
pub async fn reply(
    broker: &dyn MessageBroker,
    response_exchange: &str,
    task: &TaskRequest,
    result: TaskResult,
) -> Result<bool> {
    let (Some(token), Some(reply_to)) = (&task.correlation_token, &task.reply_to) else {
        trace!(runtime = %task.runtime, "Fire-and-forget task, no reply");
        return Ok(false);
    };
    if reply_to.is_empty() {
        return InvalidArgumentSnafu { message: "task reply-to address is empty" }.fail();
    }

    let properties = Properties {
        content_type: Some(PROTOBUF_CONTENT_TYPE.to_owned()),
        ..Properties::default()
    }
    .with_correlation_id(token.as_str());
    broker
        .publish(response_exchange, reply_to, Bytes::from(result.encode_to_vec()), properties)
        .await
        .map_err(|e| broker_error(&e))?;
    debug!(correlation_id = %token, reply_to = %reply_to, "Task result published");
    Ok(true)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::sync::Arc;

    use stratus_broker::{ExchangeKind, ExchangeOptions, InMemoryBroker};
    use stratus_types::{BundleHash, ErrorCode, Lambda, LambdaUuid, Namespace};

    use super::*;
    use crate::{ReplyAddress, TaskDispatcher};

    fn lambda() -> Lambda {
        Lambda {
            namespace: Namespace::new("acme"),
            uuid: LambdaUuid::new("thumb"),
            runtime: Runtime::new("wasm"),
            bundle_hash: BundleHash::new("h1"),
            ensure_exactly_one_delivery: false,
        }
    }

    #[tokio::test]
    async fn test_decode_task_with_reply_address() {
        let broker = InMemoryBroker::new();
        let dispatcher =
            TaskDispatcher::declare(Arc::new(broker.clone()), "lambda.tasks").await.unwrap();
        let queue =
            declare_worker_queue(&broker, "lambda.tasks", &Runtime::new("wasm")).await.unwrap();
        let reply = ReplyAddress {
            correlation_token: CorrelationToken::new("tok-9"),
            reply_to: "amq.gen-1".to_string(),
        };
        dispatcher.publish(&lambda(), b"img".to_vec(), Some(&reply)).await.unwrap();

        let mut consumer = broker.consume(&queue, "worker").await.unwrap();
        let task = TaskRequest::decode(&consumer.next().await.unwrap()).unwrap();
        assert!(task.expects_reply());
        assert_eq!(task.runtime.as_str(), "wasm");
        assert_eq!(task.correlation_token, Some(CorrelationToken::new("tok-9")));
        assert_eq!(task.envelope.payload, b"img");
        assert_eq!(task.envelope.lambda.unwrap().uuid, "thumb");
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let delivery = Delivery {
            delivery_tag: 1,
            exchange: "lambda.tasks".to_string(),
            routing_key: "wasm".to_string(),
            body: Bytes::from_static(&[0xff, 0xff, 0xff]),
            properties: Properties::default(),
        };
        let err = TaskRequest::decode(&delivery).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Serialization);
    }

    #[tokio::test]
    async fn test_reply_skips_fire_and_forget() {
        let broker = InMemoryBroker::new();
        let task = TaskRequest {
            envelope: TaskEnvelope::default(),
            runtime: Runtime::new("wasm"),
            correlation_token: None,
            reply_to: None,
        };
        // No response exchange declared: a publish attempt would fail.
        let sent = reply(&broker, "lambda.responses", &task, TaskResult::success(Vec::new()))
            .await
            .unwrap();
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_reply_routes_by_reply_to_with_correlation_id() {
        let broker = InMemoryBroker::new();
        broker
            .declare_exchange("lambda.responses", ExchangeKind::Direct, ExchangeOptions::durable())
            .await
            .unwrap();
        let queue = broker.declare_queue("", QueueOptions::reply()).await.unwrap();
        broker.bind_queue(&queue, "lambda.responses", &queue).await.unwrap();
        let mut consumer = broker.consume(&queue, "caller").await.unwrap();

        let task = TaskRequest {
            envelope: TaskEnvelope::default(),
            runtime: Runtime::new("wasm"),
            correlation_token: Some(CorrelationToken::new("tok-3")),
            reply_to: Some(queue.clone()),
        };
        let sent = reply(&broker, "lambda.responses", &task, TaskResult::success(b"ok".to_vec()))
            .await
            .unwrap();
        assert!(sent);

        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.properties.correlation_id.as_deref(), Some("tok-3"));
        let result = TaskResult::decode(delivery.body).unwrap();
        assert_eq!(result.into_payload().unwrap(), b"ok");
    }
}
