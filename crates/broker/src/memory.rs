//! In-process broker.
//!
//! Routing follows AMQP 0-9-1 semantics for the supported subset: messages
//! published to an exchange are copied to every matching bound queue, queued
//! messages wait until a consumer attaches, and consumers of one queue are
//! served round-robin.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::{
    MessageBroker,
    error::{BrokerError, Result},
    types::{Consumer, Delivery, ExchangeKind, ExchangeOptions, Properties, QueueOptions},
};

/// Prefix of broker-generated queue names.
const GENERATED_QUEUE_PREFIX: &str = "amq.gen-";

#[derive(Debug)]
struct Exchange {
    kind: ExchangeKind,
    options: ExchangeOptions,
    /// `(queue, routing_key)` pairs.
    bindings: Vec<(String, String)>,
}

#[derive(Debug)]
struct ConsumerSlot {
    id: u64,
    sender: mpsc::UnboundedSender<Delivery>,
}

#[derive(Debug)]
struct Queue {
    options: QueueOptions,
    ready: VecDeque<Delivery>,
    consumers: Vec<ConsumerSlot>,
    next_consumer: usize,
}

impl Queue {
    fn new(options: QueueOptions) -> Self {
        Self { options, ready: VecDeque::new(), consumers: Vec::new(), next_consumer: 0 }
    }

    /// Hands `delivery` to the next live consumer, or keeps it queued.
    fn enqueue(&mut self, mut delivery: Delivery) {
        while !self.consumers.is_empty() {
            let index = self.next_consumer % self.consumers.len();
            match self.consumers[index].sender.send(delivery) {
                Ok(()) => {
                    self.next_consumer = index + 1;
                    return;
                }
                Err(mpsc::error::SendError(returned)) => {
                    // Receiver gone before its cancel hook ran.
                    self.consumers.remove(index);
                    delivery = returned;
                }
            }
        }
        self.ready.push_back(delivery);
    }
}

#[derive(Debug, Default)]
struct State {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    closed: bool,
}

impl State {
    fn ensure_open(&self) -> Result<()> {
        if self.closed { Err(BrokerError::Closed) } else { Ok(()) }
    }

    fn remove_queue(&mut self, name: &str) -> Option<Queue> {
        let queue = self.queues.remove(name)?;
        for exchange in self.exchanges.values_mut() {
            exchange.bindings.retain(|(bound, _)| bound != name);
        }
        Some(queue)
    }
}

/// In-process [`MessageBroker`].
///
/// Cheap to clone; clones share the same exchanges and queues.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryBroker {
    /// Creates an empty broker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting in `queue` for a consumer.
    pub fn queue_depth(&self, queue: &str) -> Option<usize> {
        self.state.lock().queues.get(queue).map(|q| q.ready.len())
    }

    /// Number of consumers attached to `queue`.
    pub fn consumer_count(&self, queue: &str) -> Option<usize> {
        self.state.lock().queues.get(queue).map(|q| q.consumers.len())
    }

    /// Whether `queue` exists.
    pub fn queue_exists(&self, queue: &str) -> bool {
        self.state.lock().queues.contains_key(queue)
    }

    /// Closes the broker. Every consumer stream ends and every further
    /// operation fails with [`BrokerError::Closed`].
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        // Dropping the senders ends the consumer streams.
        for queue in state.queues.values_mut() {
            queue.consumers.clear();
        }
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Detaches consumer `id` from `queue`, deleting the queue if it is
/// auto-delete and now unused.
fn cancel_consumer(state: &Weak<Mutex<State>>, queue: &str, id: u64) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let mut state = state.lock();
    let Some(entry) = state.queues.get_mut(queue) else {
        return;
    };
    entry.consumers.retain(|slot| slot.id != id);
    if entry.options.auto_delete && entry.consumers.is_empty() {
        state.remove_queue(queue);
        tracing::debug!(queue, "Auto-delete queue removed with its last consumer");
    }
}

#[async_trait]
impl MessageBroker for InMemoryBroker {
    async fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        options: ExchangeOptions,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if let Some(existing) = state.exchanges.get(name) {
            if existing.kind != kind || existing.options != options {
                return Err(BrokerError::PreconditionFailed {
                    message: format!("exchange {name:?} redeclared with different settings"),
                });
            }
            return Ok(());
        }
        state.exchanges.insert(name.to_owned(), Exchange { kind, options, bindings: Vec::new() });
        tracing::debug!(exchange = name, ?kind, durable = options.durable, "Exchange declared");
        Ok(())
    }

    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<String> {
        let name = if name.is_empty() {
            format!("{GENERATED_QUEUE_PREFIX}{}", uuid::Uuid::new_v4().simple())
        } else {
            name.to_owned()
        };

        let mut state = self.state.lock();
        state.ensure_open()?;
        if let Some(existing) = state.queues.get(&name) {
            if existing.options != options {
                return Err(BrokerError::PreconditionFailed {
                    message: format!("queue {name:?} redeclared with different settings"),
                });
            }
            return Ok(name);
        }
        state.queues.insert(name.clone(), Queue::new(options));
        tracing::debug!(
            queue = %name,
            durable = options.durable,
            exclusive = options.exclusive,
            auto_delete = options.auto_delete,
            "Queue declared"
        );
        Ok(name)
    }

    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if !state.queues.contains_key(queue) {
            return Err(BrokerError::QueueNotFound { name: queue.to_owned() });
        }
        let Some(entry) = state.exchanges.get_mut(exchange) else {
            return Err(BrokerError::ExchangeNotFound { name: exchange.to_owned() });
        };
        let binding = (queue.to_owned(), routing_key.to_owned());
        if !entry.bindings.contains(&binding) {
            entry.bindings.push(binding);
        }
        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: Bytes,
        properties: Properties,
    ) -> Result<()> {
        let delivery_tag = self.next_id();
        let mut state = self.state.lock();
        state.ensure_open()?;
        let Some(entry) = state.exchanges.get(exchange) else {
            return Err(BrokerError::ExchangeNotFound { name: exchange.to_owned() });
        };

        let targets: Vec<String> = entry
            .bindings
            .iter()
            .filter(|(_, key)| entry.kind == ExchangeKind::Fanout || key == routing_key)
            .map(|(queue, _)| queue.clone())
            .collect();

        if targets.is_empty() {
            tracing::debug!(exchange, routing_key, "Unroutable message dropped");
            return Ok(());
        }

        for queue in targets {
            if let Some(queue) = state.queues.get_mut(&queue) {
                queue.enqueue(Delivery {
                    delivery_tag,
                    exchange: exchange.to_owned(),
                    routing_key: routing_key.to_owned(),
                    body: body.clone(),
                    properties: properties.clone(),
                });
            }
        }
        Ok(())
    }

    async fn consume(&self, queue: &str, consumer_tag: &str) -> Result<Consumer> {
        let id = self.next_id();
        let (sender, receiver) = mpsc::unbounded_channel();

        {
            let mut state = self.state.lock();
            state.ensure_open()?;
            let Some(entry) = state.queues.get_mut(queue) else {
                return Err(BrokerError::QueueNotFound { name: queue.to_owned() });
            };
            if entry.options.exclusive && !entry.consumers.is_empty() {
                return Err(BrokerError::ExclusiveQueueInUse { name: queue.to_owned() });
            }
            entry.consumers.push(ConsumerSlot { id, sender });
            let backlog: Vec<_> = entry.ready.drain(..).collect();
            for delivery in backlog {
                entry.enqueue(delivery);
            }
        }

        let weak = Arc::downgrade(&self.state);
        let queue_name = queue.to_owned();
        let on_cancel = Box::new(move || cancel_consumer(&weak, &queue_name, id));
        tracing::debug!(queue, consumer_tag, "Consumer attached");
        Ok(Consumer::new(consumer_tag, queue, receiver, on_cancel))
    }

    async fn delete_queue(&self, queue: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.remove_queue(queue);
        Ok(())
    }
}
