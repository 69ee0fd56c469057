//! Invocation entrypoint: `call` (fire-and-forget) and `execute` (request/response).
//!
//! ```text
//! call:    resolve ──► publish ──► Ok
//! execute: resolve ──► register(token) ──► publish(token, reply_to) ──► wait ─┬─► payload
//!                                                                             ├─► Worker{code}
//!                                                                             └─► DeadlineExceeded
//! ```
//!
//! The waiter is registered before the publish so a fast reply can never
//! arrive ahead of its registration. Neither operation retries: a timed-out
//! `execute` is final for the caller.

use std::sync::Arc;

use stratus_broker::MessageBroker;
use stratus_types::{
    CorrelationToken, LambdaError, LambdaUuid, Namespace, Result,
    config::{BrokerTopologyConfig, EntrypointConfig},
};
use tracing::{debug, instrument};

use crate::{
    dispatcher::{ReplyAddress, TaskDispatcher},
    metrics::{self, Timer},
    resolver::LambdaResolver,
    router::CorrelationRouter,
};

/// Dispatches invocations of registered lambdas.
pub struct Entrypoint {
    resolver: Arc<dyn LambdaResolver>,
    dispatcher: TaskDispatcher,
    router: Arc<CorrelationRouter>,
    config: EntrypointConfig,
}

impl Entrypoint {
    /// Declares the broker topology and starts the correlation router.
    ///
    /// # Errors
    ///
    /// Returns [`LambdaError::Broker`] if the broker refuses the topology.
    pub async fn start(
        resolver: Arc<dyn LambdaResolver>,
        broker: Arc<dyn MessageBroker>,
        topology: &BrokerTopologyConfig,
        config: EntrypointConfig,
    ) -> Result<Self> {
        let dispatcher =
            TaskDispatcher::declare(Arc::clone(&broker), &topology.task_exchange).await?;
        let router = CorrelationRouter::start(broker, &topology.response_exchange).await?;
        Ok(Self { resolver, dispatcher, router, config })
    }

    /// Publishes a task and returns once the broker accepted it.
    ///
    /// Says nothing about whether a worker will run it.
    ///
    /// # Errors
    ///
    /// Returns the resolution error unchanged, or [`LambdaError::Broker`] if
    /// the publish is refused.
    #[instrument(skip(self, payload), fields(payload_bytes = payload.len()))]
    pub async fn call(
        &self,
        namespace: &Namespace,
        uuid: &LambdaUuid,
        payload: Vec<u8>,
    ) -> Result<()> {
        let result = self.call_inner(namespace, uuid, payload).await;
        metrics::record_call(result.is_ok());
        result
    }

    async fn call_inner(
        &self,
        namespace: &Namespace,
        uuid: &LambdaUuid,
        payload: Vec<u8>,
    ) -> Result<()> {
        let lambda = self.resolver.resolve(namespace, uuid).await?;
        self.dispatcher.publish(&lambda, payload, None).await
    }

    /// Publishes a task and waits for the worker's reply.
    ///
    /// `timeout_millis == 0` selects the configured default; larger values
    /// are capped at the configured maximum.
    ///
    /// # Errors
    ///
    /// - The resolution error unchanged (a missing lambda is `NotFound`).
    /// - [`LambdaError::DeadlineExceeded`] if no reply arrived in time.
    /// - [`LambdaError::Worker`] with the worker's status if it reported failure.
    /// - [`LambdaError::Broker`] if the publish is refused or the router stopped.
    #[instrument(skip(self, payload), fields(payload_bytes = payload.len()))]
    pub async fn execute(
        &self,
        namespace: &Namespace,
        uuid: &LambdaUuid,
        payload: Vec<u8>,
        timeout_millis: u64,
    ) -> Result<Vec<u8>> {
        let timer = Timer::start();
        let result = self.execute_inner(namespace, uuid, payload, timeout_millis).await;
        metrics::record_execute(execute_outcome(&result), timer.elapsed_secs());
        result
    }

    async fn execute_inner(
        &self,
        namespace: &Namespace,
        uuid: &LambdaUuid,
        payload: Vec<u8>,
        timeout_millis: u64,
    ) -> Result<Vec<u8>> {
        let lambda = self.resolver.resolve(namespace, uuid).await?;
        let timeout = self.config.effective_timeout(timeout_millis);

        let waiter = self.router.register(CorrelationToken::generate())?;
        let reply = ReplyAddress {
            correlation_token: waiter.token().clone(),
            reply_to: self.router.reply_queue().to_owned(),
        };
        debug!(correlation_id = %reply.correlation_token, ?timeout, "Executing lambda");

        // On failure the waiter is dropped here, releasing its registration.
        self.dispatcher.publish(&lambda, payload, Some(&reply)).await?;
        waiter.wait(timeout).await?.into_payload()
    }

    /// The correlation router serving this entrypoint.
    pub fn router(&self) -> &Arc<CorrelationRouter> {
        &self.router
    }

    /// Stops the correlation router. In-flight executions fail.
    pub async fn shutdown(&self) {
        self.router.shutdown().await;
    }
}

impl std::fmt::Debug for Entrypoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entrypoint")
            .field("dispatcher", &self.dispatcher)
            .field("router", &self.router)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn execute_outcome(result: &Result<Vec<u8>>) -> &'static str {
    match result {
        Ok(_) => "success",
        Err(LambdaError::DeadlineExceeded { .. }) => "deadline_exceeded",
        Err(LambdaError::Worker { .. }) => "worker_error",
        Err(LambdaError::NotFound { .. }) => "not_found",
        Err(_) => "error",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::time::{Duration, Instant};

    use prost::Message;
    use stratus_broker::{InMemoryBroker, QueueOptions};
    use stratus_proto::proto::{TaskEnvelope, TaskResult};
    use stratus_store::Database;
    use stratus_types::{BundleHash, ErrorCode, Lambda, Runtime};
    use tonic::Code;

    use super::*;
    use crate::{LambdaManager, StaticNamespaces, worker};

    struct Fixture {
        broker: InMemoryBroker,
        manager: Arc<LambdaManager>,
        entrypoint: Entrypoint,
    }

    async fn fixture() -> Fixture {
        let broker = InMemoryBroker::new();
        let manager = Arc::new(
            LambdaManager::builder()
                .db(Arc::new(Database::open_in_memory()))
                .namespaces(Arc::new(StaticNamespaces::new(["acme"])))
                .build(),
        );
        let entrypoint = Entrypoint::start(
            Arc::clone(&manager) as Arc<dyn LambdaResolver>,
            Arc::new(broker.clone()),
            &BrokerTopologyConfig::default(),
            EntrypointConfig::default(),
        )
        .await
        .unwrap();
        manager
            .create(
                Lambda {
                    namespace: Namespace::new("acme"),
                    uuid: LambdaUuid::new("echo"),
                    runtime: Runtime::new("echo-rt"),
                    bundle_hash: BundleHash::new("h1"),
                    ensure_exactly_one_delivery: false,
                },
                b"code",
            )
            .await
            .unwrap();
        Fixture { broker, manager, entrypoint }
    }

    async fn worker_consumer(broker: &InMemoryBroker) -> stratus_broker::Consumer {
        let queue = broker.declare_queue("echo-rt", QueueOptions::durable()).await.unwrap();
        broker.bind_queue(&queue, "lambda.tasks", "echo-rt").await.unwrap();
        broker.consume(&queue, "worker").await.unwrap()
    }

    #[tokio::test]
    async fn test_call_publishes_without_reply_address() {
        let f = fixture().await;
        let mut consumer = worker_consumer(&f.broker).await;

        f.entrypoint
            .call(&Namespace::new("acme"), &LambdaUuid::new("echo"), b"in".to_vec())
            .await
            .unwrap();

        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.properties.reply_to, None);
        assert_eq!(TaskEnvelope::decode(delivery.body).unwrap().payload, b"in");
        assert_eq!(f.entrypoint.router().pending(), 0);
    }

    #[tokio::test]
    async fn test_call_unknown_lambda_is_not_found() {
        let f = fixture().await;
        let err = f
            .entrypoint
            .call(&Namespace::new("acme"), &LambdaUuid::new("ghost"), Vec::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert!(f.manager.exists(&Namespace::new("acme"), &LambdaUuid::new("echo")).unwrap());
    }

    #[tokio::test]
    async fn test_execute_returns_worker_payload() {
        let f = fixture().await;
        let mut consumer = worker_consumer(&f.broker).await;
        let broker: Arc<dyn MessageBroker> = Arc::new(f.broker.clone());

        let worker = tokio::spawn(async move {
            let delivery = consumer.next().await.unwrap();
            let task = worker::TaskRequest::decode(&delivery).unwrap();
            let mut output = task.envelope.payload.clone();
            output.reverse();
            worker::reply(broker.as_ref(), "lambda.responses", &task, TaskResult::success(output))
                .await
                .unwrap();
        });

        let output = f
            .entrypoint
            .execute(&Namespace::new("acme"), &LambdaUuid::new("echo"), b"abc".to_vec(), 5_000)
            .await
            .unwrap();
        worker.await.unwrap();
        assert_eq!(output, b"cba");
        assert_eq!(f.entrypoint.router().pending(), 0);
    }

    #[tokio::test]
    async fn test_execute_passes_worker_status_through() {
        let f = fixture().await;
        let mut consumer = worker_consumer(&f.broker).await;
        let broker: Arc<dyn MessageBroker> = Arc::new(f.broker.clone());

        tokio::spawn(async move {
            let delivery = consumer.next().await.unwrap();
            let task = worker::TaskRequest::decode(&delivery).unwrap();
            let failure = TaskResult::failure(Code::PermissionDenied, "quota exhausted");
            worker::reply(broker.as_ref(), "lambda.responses", &task, failure).await.unwrap();
        });

        let err = f
            .entrypoint
            .execute(&Namespace::new("acme"), &LambdaUuid::new("echo"), Vec::new(), 5_000)
            .await
            .unwrap_err();
        match err {
            LambdaError::Worker { code, message } => {
                assert_eq!(code, Code::PermissionDenied as i32);
                assert_eq!(message, "quota exhausted");
            }
            other => panic!("expected worker error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_execute_times_out_and_releases_waiter() {
        let f = fixture().await;
        let _consumer = worker_consumer(&f.broker).await;

        let started = Instant::now();
        let err = f
            .entrypoint
            .execute(&Namespace::new("acme"), &LambdaUuid::new("echo"), Vec::new(), 50)
            .await
            .unwrap_err();

        assert_eq!(err.code(), ErrorCode::DeadlineExceeded);
        assert!(started.elapsed() >= Duration::from_millis(50));
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(f.entrypoint.router().pending(), 0);
    }

    #[tokio::test]
    async fn test_execute_unknown_lambda_registers_nothing() {
        let f = fixture().await;
        let err = f
            .entrypoint
            .execute(&Namespace::new("acme"), &LambdaUuid::new("ghost"), Vec::new(), 50)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
        assert_eq!(f.entrypoint.router().pending(), 0);
    }

    #[tokio::test]
    async fn test_execute_after_shutdown_fails_fast() {
        let f = fixture().await;
        f.entrypoint.shutdown().await;

        let err = f
            .entrypoint
            .execute(&Namespace::new("acme"), &LambdaUuid::new("echo"), Vec::new(), 5_000)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Broker);
    }
}
