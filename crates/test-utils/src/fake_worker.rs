//! A scripted worker pool for dispatch tests.
//!
//! [`FakeWorker`] owns a runtime's worker queue and hands each decoded task to
//! the test, which decides when (and whether) to reply. Replying out of
//! arrival order, late or never is how tests exercise the correlation router.

use std::{sync::Arc, time::Duration};

use stratus_broker::{ExchangeKind, ExchangeOptions, MessageBroker};
use stratus_lambda::worker::{self, TaskRequest};
use stratus_proto::proto::TaskResult;
use stratus_types::{Result, Runtime, config::BrokerTopologyConfig, error::BrokerSnafu};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

/// A worker consuming one runtime's task queue on behalf of a test.
pub struct FakeWorker {
    broker: Arc<dyn MessageBroker>,
    response_exchange: String,
    tasks: mpsc::UnboundedReceiver<TaskRequest>,
    pump: JoinHandle<()>,
}

impl FakeWorker {
    /// Declares the task exchange and the runtime's queue, then starts consuming.
    ///
    /// # Errors
    ///
    /// Returns the broker error if the topology cannot be declared.
    pub async fn start(
        broker: Arc<dyn MessageBroker>,
        topology: &BrokerTopologyConfig,
        runtime: &Runtime,
    ) -> Result<Self> {
        let exchange = &topology.task_exchange;
        broker
            .declare_exchange(exchange, ExchangeKind::Direct, ExchangeOptions::durable())
            .await
            .map_err(|e| BrokerSnafu { message: e.to_string() }.build())?;
        let queue = worker::declare_worker_queue(broker.as_ref(), exchange, runtime).await?;
        let mut consumer = broker
            .consume(&queue, "fake-worker")
            .await
            .map_err(|e| BrokerSnafu { message: e.to_string() }.build())?;

        let (tx, tasks) = mpsc::unbounded_channel();
        let pump = tokio::spawn(async move {
            while let Some(delivery) = consumer.next().await {
                match TaskRequest::decode(&delivery) {
                    Ok(task) => {
                        if tx.send(task).is_err() {
                            break;
                        }
                    },
                    Err(e) => warn!(error = %e, "Fake worker dropped undecodable task"),
                }
            }
        });

        Ok(Self {
            broker,
            response_exchange: topology.response_exchange.clone(),
            tasks,
            pump,
        })
    }

    /// Waits up to `timeout` for the next task.
    pub async fn next_task(&mut self, timeout: Duration) -> Option<TaskRequest> {
        tokio::time::timeout(timeout, self.tasks.recv()).await.ok().flatten()
    }

    /// Replies to `task`. Returns `false` for fire-and-forget tasks.
    ///
    /// # Errors
    ///
    /// Returns the broker error if the publish is refused.
    pub async fn reply(&self, task: &TaskRequest, result: TaskResult) -> Result<bool> {
        worker::reply(self.broker.as_ref(), &self.response_exchange, task, result).await
    }

    /// Turns the worker into a background responder.
    ///
    /// `respond` returns the result for a task, or `None` to leave it unanswered.
    pub fn respond_with<F>(mut self, respond: F) -> JoinHandle<()>
    where
        F: Fn(&TaskRequest) -> Option<TaskResult> + Send + 'static,
    {
        tokio::spawn(async move {
            while let Some(task) = self.tasks.recv().await {
                if let Some(result) = respond(&task)
                    && let Err(e) = self.reply(&task, result).await
                {
                    warn!(error = %e, "Fake worker failed to reply");
                }
            }
        })
    }
}

impl Drop for FakeWorker {
    fn drop(&mut self) {
        self.pump.abort();
    }
}
