//! End-to-end dispatch through an in-process broker and a scripted worker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use bytes::Bytes;
use prost::Message;
use stratus_broker::{InMemoryBroker, MessageBroker, Properties};
use stratus_lambda::{
    Entrypoint, LambdaManager, LambdaResolver, PROTOBUF_CONTENT_TYPE, StaticNamespaces, worker,
};
use stratus_proto::proto::TaskResult;
use stratus_store::Database;
use stratus_test_utils::{
    FakeWorker, assert_eventually, test_bundle_config, test_entrypoint_config, test_retry_config,
    test_topology,
};
use stratus_types::{BundleHash, ErrorCode, Lambda, LambdaError, LambdaUuid, Namespace, Runtime};
use tonic::Code;

const RUNTIME: &str = "python3.12";

struct Harness {
    broker: InMemoryBroker,
    entrypoint: Arc<Entrypoint>,
}

impl Harness {
    async fn start() -> Self {
        let broker = InMemoryBroker::new();
        let manager = Arc::new(
            LambdaManager::builder()
                .db(Arc::new(Database::open_in_memory()))
                .namespaces(Arc::new(StaticNamespaces::new(["acme"])))
                .retry(test_retry_config())
                .bundles(test_bundle_config())
                .build(),
        );
        manager
            .create(
                Lambda {
                    namespace: Namespace::new("acme"),
                    uuid: LambdaUuid::new("upper"),
                    runtime: Runtime::new(RUNTIME),
                    bundle_hash: BundleHash::new("bundle-1"),
                    ensure_exactly_one_delivery: false,
                },
                b"def handler(x): return x.upper()",
            )
            .await
            .unwrap();
        let entrypoint = Entrypoint::start(
            manager as Arc<dyn LambdaResolver>,
            Arc::new(broker.clone()),
            &test_topology(),
            test_entrypoint_config(),
        )
        .await
        .unwrap();
        Self { broker, entrypoint: Arc::new(entrypoint) }
    }

    async fn worker(&self) -> FakeWorker {
        FakeWorker::start(Arc::new(self.broker.clone()), &test_topology(), &Runtime::new(RUNTIME))
            .await
            .unwrap()
    }

    async fn execute(&self, payload: &[u8], timeout_millis: u64) -> Result<Vec<u8>, LambdaError> {
        self.entrypoint
            .execute(&acme(), &LambdaUuid::new("upper"), payload.to_vec(), timeout_millis)
            .await
    }
}

fn acme() -> Namespace {
    Namespace::new("acme")
}

#[tokio::test]
async fn test_execute_round_trip_through_worker() {
    let harness = Harness::start().await;
    let _responder = harness.worker().await.respond_with(|task| {
        Some(TaskResult::success(task.envelope.payload.to_ascii_uppercase()))
    });

    let output = harness.execute(b"hello", 2_000).await.unwrap();
    assert_eq!(output, b"HELLO");
    assert_eq!(harness.entrypoint.router().pending(), 0);
}

#[tokio::test]
async fn test_out_of_order_replies_reach_their_own_callers() {
    let harness = Harness::start().await;
    let mut worker = harness.worker().await;

    let first = tokio::spawn({
        let entrypoint = Arc::clone(&harness.entrypoint);
        async move {
            entrypoint.execute(&acme(), &LambdaUuid::new("upper"), b"first".to_vec(), 3_000).await
        }
    });
    let first_task = worker.next_task(Duration::from_secs(2)).await.unwrap();

    let second = tokio::spawn({
        let entrypoint = Arc::clone(&harness.entrypoint);
        async move {
            entrypoint.execute(&acme(), &LambdaUuid::new("upper"), b"second".to_vec(), 3_000).await
        }
    });
    let second_task = worker.next_task(Duration::from_secs(2)).await.unwrap();
    assert_ne!(first_task.correlation_token, second_task.correlation_token);

    // Answer the later request first.
    worker.reply(&second_task, TaskResult::success(b"2".to_vec())).await.unwrap();
    worker.reply(&first_task, TaskResult::success(b"1".to_vec())).await.unwrap();

    assert_eq!(second.await.unwrap().unwrap(), b"2");
    assert_eq!(first.await.unwrap().unwrap(), b"1");
}

#[tokio::test]
async fn test_timeout_then_late_reply_is_dropped() {
    let harness = Harness::start().await;
    let mut worker = harness.worker().await;

    let started = Instant::now();
    let err = harness.execute(b"slow", 100).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::DeadlineExceeded);
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(harness.entrypoint.router().pending(), 0);

    let abandoned = worker.next_task(Duration::from_secs(1)).await.unwrap();

    // A fresh caller is waiting while the stale reply arrives.
    let fresh = tokio::spawn({
        let entrypoint = Arc::clone(&harness.entrypoint);
        async move {
            entrypoint.execute(&acme(), &LambdaUuid::new("upper"), b"fresh".to_vec(), 3_000).await
        }
    });
    let fresh_task = worker.next_task(Duration::from_secs(2)).await.unwrap();

    worker.reply(&abandoned, TaskResult::success(b"stale".to_vec())).await.unwrap();
    worker.reply(&fresh_task, TaskResult::success(b"FRESH".to_vec())).await.unwrap();

    assert_eq!(fresh.await.unwrap().unwrap(), b"FRESH");
    let router = Arc::clone(harness.entrypoint.router());
    assert!(assert_eventually(Duration::from_secs(1), || router.pending() == 0).await);
}

#[tokio::test]
async fn test_unknown_correlation_and_garbage_do_not_stall_router() {
    let harness = Harness::start().await;
    let reply_queue = harness.entrypoint.router().reply_queue().to_owned();
    let topology = test_topology();

    let noise = [
        (Some("nobody-waits-for-this"), TaskResult::success(b"x".to_vec()).encode_to_vec()),
        (None, TaskResult::success(b"y".to_vec()).encode_to_vec()),
        (Some("garbage"), vec![0xff, 0xff, 0xff]),
    ];
    for (correlation_id, body) in noise {
        let mut properties = Properties {
            content_type: Some(PROTOBUF_CONTENT_TYPE.to_owned()),
            ..Properties::default()
        };
        if let Some(id) = correlation_id {
            properties = properties.with_correlation_id(id);
        }
        harness
            .broker
            .publish(&topology.response_exchange, &reply_queue, Bytes::from(body), properties)
            .await
            .unwrap();
    }

    let _responder = harness
        .worker()
        .await
        .respond_with(|task| Some(TaskResult::success(task.envelope.payload.clone())));
    assert_eq!(harness.execute(b"still-alive", 2_000).await.unwrap(), b"still-alive");
}

#[tokio::test]
async fn test_worker_error_status_passes_through() {
    let harness = Harness::start().await;
    let _responder = harness.worker().await.respond_with(|_| {
        Some(TaskResult::failure(Code::ResourceExhausted, "worker pool saturated"))
    });

    match harness.execute(b"", 2_000).await.unwrap_err() {
        LambdaError::Worker { code, message } => {
            assert_eq!(code, Code::ResourceExhausted as i32);
            assert_eq!(message, "worker pool saturated");
        },
        other => panic!("expected worker error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_missing_lambda_and_silent_worker_are_distinguishable() {
    let harness = Harness::start().await;

    let missing = harness
        .entrypoint
        .execute(&acme(), &LambdaUuid::new("does-not-exist"), Vec::new(), 50)
        .await
        .unwrap_err();
    assert_eq!(missing.code(), ErrorCode::NotFound);

    let silent = harness.execute(b"", 50).await.unwrap_err();
    assert_eq!(silent.code(), ErrorCode::DeadlineExceeded);
}

#[tokio::test]
async fn test_call_without_worker_waits_durably_in_queue() {
    let harness = Harness::start().await;
    // The worker pool's queue exists but nobody consumes it yet.
    let task_exchange = test_topology().task_exchange;
    worker::declare_worker_queue(&harness.broker, &task_exchange, &Runtime::new(RUNTIME))
        .await
        .unwrap();

    harness
        .entrypoint
        .call(&acme(), &LambdaUuid::new("upper"), b"queued".to_vec())
        .await
        .unwrap();
    assert_eq!(harness.broker.queue_depth(RUNTIME), Some(1));

    let mut worker = harness.worker().await;
    let task = worker.next_task(Duration::from_secs(2)).await.unwrap();
    assert!(!task.expects_reply());
    assert_eq!(task.envelope.payload, b"queued");
    assert!(!worker.reply(&task, TaskResult::success(Vec::new())).await.unwrap());
}

#[tokio::test]
async fn test_many_concurrent_executions_each_get_their_result() {
    let harness = Harness::start().await;
    let _responder = harness.worker().await.respond_with(|task| {
        Some(TaskResult::success(task.envelope.payload.to_ascii_uppercase()))
    });

    let calls: Vec<_> = (0..32)
        .map(|i| {
            let entrypoint = Arc::clone(&harness.entrypoint);
            tokio::spawn(async move {
                let input = format!("call-{i}");
                let output = entrypoint
                    .execute(&acme(), &LambdaUuid::new("upper"), input.clone().into_bytes(), 3_000)
                    .await
                    .unwrap();
                (input, output)
            })
        })
        .collect();

    for call in calls {
        let (input, output) = call.await.unwrap();
        assert_eq!(output, input.to_ascii_uppercase().into_bytes());
    }
    assert_eq!(harness.entrypoint.router().pending(), 0);
}
