//! End-to-end check of a bootstrapped `all` role process: register a lambda
//! over gRPC, then execute it against a fake worker pool on the same broker.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::{sync::Arc, time::Duration};

use stratus_broker::InMemoryBroker;
use stratus_proto::proto::{
    CallRequest, CreateLambdaRequest, ExecuteRequest, TaskResult,
    lambda_entrypoint_service_client::LambdaEntrypointServiceClient,
    lambda_manager_service_client::LambdaManagerServiceClient,
};
use stratus_server::{bootstrap::bootstrap_node, config::Config};
use stratus_test_utils::FakeWorker;
use stratus_types::Runtime;
use tokio::{net::TcpListener, sync::watch};
use tonic::Code;

#[tokio::test]
async fn test_bootstrapped_node_serves_manager_and_entrypoint() {
    let broker = InMemoryBroker::new();
    let mut config = Config::default();
    config.namespaces.names = vec!["acme".to_string()];
    config.listen_addr = "127.0.0.1:0".parse().unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let node = bootstrap_node(&config, Arc::new(broker.clone()), shutdown_rx).await.unwrap();
    let entrypoint = node.entrypoint.clone().unwrap();

    let listener = TcpListener::bind(config.listen_addr).await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(node.server.serve_with_listener(listener));
    let endpoint = format!("http://{addr}");

    let worker =
        FakeWorker::start(Arc::new(broker.clone()), &config.broker, &Runtime::new("shout"))
            .await
            .unwrap();
    let responder = worker.respond_with(|task| {
        Some(TaskResult::success(task.envelope.payload.to_ascii_uppercase()))
    });

    let mut manager = LambdaManagerServiceClient::connect(endpoint.clone()).await.unwrap();
    manager
        .create(CreateLambdaRequest {
            namespace: "acme".to_string(),
            uuid: "upper".to_string(),
            runtime: "shout".to_string(),
            bundle_hash: "b1".to_string(),
            bundle_data: b"print(input.upper())".to_vec(),
            ensure_exactly_one_delivery: false,
        })
        .await
        .unwrap();

    let mut client = LambdaEntrypointServiceClient::connect(endpoint).await.unwrap();
    let output = client
        .execute(ExecuteRequest {
            namespace: "acme".to_string(),
            uuid: "upper".to_string(),
            payload: b"hello".to_vec(),
            timeout_millis: 2_000,
        })
        .await
        .unwrap()
        .into_inner();
    assert_eq!(output.payload, b"HELLO");

    client
        .call(CallRequest {
            namespace: "acme".to_string(),
            uuid: "upper".to_string(),
            payload: b"fire".to_vec(),
        })
        .await
        .unwrap();

    let missing = client
        .execute(ExecuteRequest {
            namespace: "acme".to_string(),
            uuid: "ghost".to_string(),
            payload: Vec::new(),
            timeout_millis: 100,
        })
        .await
        .unwrap_err();
    assert_eq!(missing.code(), Code::NotFound);
    assert_eq!(entrypoint.router().pending(), 0);

    drop(manager);
    drop(client);
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), server).await.unwrap().unwrap().unwrap();
    entrypoint.shutdown().await;
    responder.abort();
}
