//! Correlation of asynchronous replies with waiting callers.
//!
//! Each entrypoint process owns one private reply queue: server-named,
//! exclusive, auto-delete, and bound to the response exchange under its own
//! name. A single consumption loop drains it and hands every reply to the
//! caller registered under the reply's correlation id.
//!
//! ## Waiter lifecycle
//!
//! ```text
//! register(token) ──► map[token] = oneshot::Sender
//!        │
//!        ├── reply arrives ──► loop removes map[token], sends result ──► Waiter::wait returns it
//!        │
//!        └── timeout / caller dropped ──► Waiter::drop removes map[token]
//! ```
//!
//! Insert, claim-and-remove and timeout-remove are single operations on a
//! sharded concurrent map, so they are mutually exclusive per token. A hand-off
//! is a non-blocking oneshot send: a slow caller never stalls the loop, and a
//! caller that already gave up simply never sees the result.
//!
//! Replies that cannot be decoded or whose token has no live waiter are
//! dropped. They are never requeued.

use std::{sync::Arc, time::Duration};

use dashmap::{DashMap, mapref::entry::Entry};
use parking_lot::Mutex;
use prost::Message;
use stratus_broker::{
    Consumer, Delivery, ExchangeKind, ExchangeOptions, MessageBroker, QueueOptions,
};
use stratus_proto::proto::TaskResult;
use stratus_types::{
    CorrelationToken, LambdaError, Result,
    error::{BrokerSnafu, InternalSnafu},
};
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{error::broker_error, metrics};

/// Consumer tag of the reply loop.
const CONSUMER_TAG: &str = "stratus-correlation-router";

/// Routes replies from this process's reply queue to waiting callers.
pub struct CorrelationRouter {
    reply_queue: String,
    waiters: DashMap<CorrelationToken, oneshot::Sender<TaskResult>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl CorrelationRouter {
    /// Declares the response exchange and a private reply queue, then starts
    /// the consumption loop.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Broker`] if any declaration or the consumer is
    /// refused.
    pub async fn start(
        broker: Arc<dyn MessageBroker>,
        response_exchange: &str,
    ) -> Result<Arc<Self>> {
        broker
            .declare_exchange(response_exchange, ExchangeKind::Direct, ExchangeOptions::durable())
            .await
            .map_err(|e| broker_error(&e))?;
        let reply_queue =
            broker.declare_queue("", QueueOptions::reply()).await.map_err(|e| broker_error(&e))?;
        broker
            .bind_queue(&reply_queue, response_exchange, &reply_queue)
            .await
            .map_err(|e| broker_error(&e))?;
        let consumer =
            broker.consume(&reply_queue, CONSUMER_TAG).await.map_err(|e| broker_error(&e))?;

        let router = Arc::new(Self {
            reply_queue,
            waiters: DashMap::new(),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        });
        let handle = tokio::spawn(Arc::clone(&router).run(consumer));
        *router.task.lock() = Some(handle);

        info!(
            queue = %router.reply_queue,
            exchange = response_exchange,
            "Correlation router started"
        );
        Ok(router)
    }

    /// Name of the reply queue, to be used as the reply-to address.
    pub fn reply_queue(&self) -> &str {
        &self.reply_queue
    }

    /// Number of callers currently waiting for a reply.
    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    /// Whether the consumption loop has stopped or been asked to stop.
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Registers a waiter for `token`.
    ///
    /// Must be called before the request carrying `token` is published so a
    /// fast reply cannot overtake the registration.
    ///
    /// # Errors
    ///
    /// - [`LambdaError::Internal`] if `token` already has a live waiter.
    /// - [`LambdaError::Broker`] if the router has stopped.
    pub fn register(self: &Arc<Self>, token: CorrelationToken) -> Result<Waiter> {
        let (sender, receiver) = oneshot::channel();
        match self.waiters.entry(token.clone()) {
            Entry::Occupied(_) => {
                return InternalSnafu {
                    message: format!("correlation token {token} already has a waiter"),
                }
                .fail();
            }
            Entry::Vacant(slot) => {
                slot.insert(sender);
            }
        }
        // Checked after inserting: the loop cancels before clearing the map on exit.
        if self.cancel.is_cancelled() {
            self.waiters.remove(&token);
            return BrokerSnafu { message: "correlation router is stopped" }.fail();
        }
        metrics::set_pending_waiters(self.waiters.len());
        Ok(Waiter { token, receiver, router: Arc::clone(self) })
    }

    /// Stops the consumption loop and waits for it to exit.
    ///
    /// Dropping the consumer removes the auto-delete reply queue. Callers
    /// still waiting fail with [`LambdaError::Broker`].
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.task.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            warn!(error = %e, "Correlation router task failed");
        }
    }

    async fn run(self: Arc<Self>, mut consumer: Consumer) {
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    debug!(queue = %self.reply_queue, "Correlation router cancelled");
                    break;
                }
                delivery = consumer.next() => match delivery {
                    Some(delivery) => self.route(delivery),
                    None => {
                        warn!(queue = %self.reply_queue, "Reply consumer closed by broker");
                        break;
                    }
                },
            }
        }

        drop(consumer);
        self.cancel.cancel();
        let abandoned = self.waiters.len();
        self.waiters.clear();
        metrics::set_pending_waiters(0);
        info!(queue = %self.reply_queue, abandoned, "Correlation router stopped");
    }

    fn route(&self, delivery: Delivery) {
        let Some(token) = delivery.properties.correlation_id.as_deref() else {
            warn!(delivery_tag = delivery.delivery_tag, "Reply without correlation id dropped");
            metrics::record_reply_dropped("malformed");
            return;
        };
        let token = CorrelationToken::new(token);

        let result = match TaskResult::decode(delivery.body) {
            Ok(result) => result,
            Err(e) => {
                warn!(correlation_id = %token, error = %e, "Undecodable reply dropped");
                metrics::record_reply_dropped("malformed");
                return;
            }
        };

        let Some((_, sender)) = self.waiters.remove(&token) else {
            debug!(correlation_id = %token, "Reply has no waiter, dropped");
            metrics::record_reply_dropped("unclaimed");
            return;
        };
        metrics::set_pending_waiters(self.waiters.len());

        if sender.send(result).is_err() {
            debug!(correlation_id = %token, "Waiter gave up before hand-off, reply dropped");
            metrics::record_reply_dropped("unclaimed");
        } else {
            debug!(correlation_id = %token, "Reply routed");
            metrics::record_reply_routed();
        }
    }
}

impl std::fmt::Debug for CorrelationRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CorrelationRouter")
            .field("reply_queue", &self.reply_queue)
            .field("pending", &self.waiters.len())
            .field("stopped", &self.cancel.is_cancelled())
            .finish()
    }
}

/// A registered, single-use slot for one reply.
///
/// Dropping the waiter, whether after a reply, a timeout or cancellation of
/// the caller's future, removes its registration.
#[derive(Debug)]
pub struct Waiter {
    token: CorrelationToken,
    receiver: oneshot::Receiver<TaskResult>,
    router: Arc<CorrelationRouter>,
}

impl Waiter {
    /// Correlation token this waiter answers to.
    pub fn token(&self) -> &CorrelationToken {
        &self.token
    }

    /// Waits up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// - [`LambdaError::DeadlineExceeded`] if no reply arrived in time.
    /// - [`LambdaError::Broker`] if the router stopped first.
    pub async fn wait(mut self, timeout: Duration) -> Result<TaskResult> {
        match tokio::time::timeout(timeout, &mut self.receiver).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => {
                BrokerSnafu { message: "correlation router stopped before a reply arrived" }.fail()
            }
            Err(_) => {
                debug!(correlation_id = %self.token, ?timeout, "No reply before deadline");
                Err(LambdaError::DeadlineExceeded {
                    timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        if self.router.waiters.remove(&self.token).is_some() {
            debug!(correlation_id = %self.token, "Waiter released without a reply");
        }
        metrics::set_pending_waiters(self.router.waiters.len());
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use bytes::Bytes;
    use stratus_broker::{InMemoryBroker, Properties};
    use stratus_types::ErrorCode;

    use super::*;

    const RESPONSES: &str = "lambda.responses";

    async fn router() -> (InMemoryBroker, Arc<CorrelationRouter>) {
        let broker = InMemoryBroker::new();
        let router = CorrelationRouter::start(Arc::new(broker.clone()), RESPONSES).await.unwrap();
        (broker, router)
    }

    async fn reply(broker: &InMemoryBroker, queue: &str, token: &str, body: Bytes) {
        let properties = Properties::default().with_correlation_id(token);
        broker.publish(RESPONSES, queue, body, properties).await.unwrap();
    }

    fn success(payload: &[u8]) -> Bytes {
        Bytes::from(TaskResult::success(payload.to_vec()).encode_to_vec())
    }

    #[tokio::test]
    async fn test_setup_declares_private_reply_queue() {
        let (broker, router) = router().await;
        assert!(router.reply_queue().starts_with("amq.gen-"));
        assert_eq!(broker.consumer_count(router.reply_queue()), Some(1));
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_reply_reaches_registered_waiter() {
        let (broker, router) = router().await;
        let waiter = router.register(CorrelationToken::new("t1")).unwrap();
        assert_eq!(router.pending(), 1);

        reply(&broker, router.reply_queue(), "t1", success(b"out")).await;

        let result = waiter.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.payload, b"out");
        assert_eq!(router.pending(), 0);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_releases_registration() {
        let (_broker, router) = router().await;
        let waiter = router.register(CorrelationToken::new("t1")).unwrap();

        let err = waiter.wait(Duration::from_millis(20)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::DeadlineExceeded);
        assert_eq!(router.pending(), 0);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_late_reply_is_not_delivered_to_another_waiter() {
        let (broker, router) = router().await;
        let stale = router.register(CorrelationToken::new("stale")).unwrap();
        stale.wait(Duration::from_millis(10)).await.unwrap_err();

        let fresh = router.register(CorrelationToken::new("fresh")).unwrap();
        reply(&broker, router.reply_queue(), "stale", success(b"late")).await;
        reply(&broker, router.reply_queue(), "fresh", success(b"mine")).await;

        let result = fresh.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.payload, b"mine");
        assert_eq!(router.pending(), 0);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_malformed_reply_leaves_waiter_pending() {
        let (broker, router) = router().await;
        let waiter = router.register(CorrelationToken::new("t1")).unwrap();

        reply(&broker, router.reply_queue(), "t1", Bytes::from_static(&[0xff, 0xff, 0xff])).await;
        let missing_token = Properties::default();
        broker
            .publish(RESPONSES, router.reply_queue(), success(b"x"), missing_token)
            .await
            .unwrap();
        reply(&broker, router.reply_queue(), "t1", success(b"good")).await;

        let result = waiter.wait(Duration::from_secs(5)).await.unwrap();
        assert_eq!(result.payload, b"good");
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_duplicate_token_is_rejected() {
        let (_broker, router) = router().await;
        let _first = router.register(CorrelationToken::new("t1")).unwrap();

        let err = router.register(CorrelationToken::new("t1")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(router.pending(), 1, "rejected duplicate must not evict the live waiter");
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_dropped_waiter_is_removed() {
        let (_broker, router) = router().await;
        let waiter = router.register(CorrelationToken::new("t1")).unwrap();
        assert_eq!(waiter.token().as_str(), "t1");
        drop(waiter);
        assert_eq!(router.pending(), 0);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_fails_waiters_and_deletes_queue() {
        let (broker, router) = router().await;
        let queue = router.reply_queue().to_owned();
        let waiter = router.register(CorrelationToken::new("t1")).unwrap();

        router.shutdown().await;

        assert!(router.is_stopped());
        assert!(!broker.queue_exists(&queue));
        let err = waiter.wait(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Broker);

        let err = router.register(CorrelationToken::new("t2")).unwrap_err();
        assert_eq!(err.code(), ErrorCode::Broker);
        assert_eq!(router.pending(), 0);
    }

    #[tokio::test]
    async fn test_broker_close_stops_loop() {
        let (broker, router) = router().await;
        let waiter = router.register(CorrelationToken::new("t1")).unwrap();

        broker.close();

        let err = waiter.wait(Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Broker);
        assert!(router.is_stopped());
    }
}
