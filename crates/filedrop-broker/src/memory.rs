//! In-process test double with the delivery semantics the pipeline relies on.
//!
//! It is never selected from configuration; callers inject it where a [`Broker`] is
//! expected, and `amqp_url` is ignored in that case.
//!
//! # Design
//! - Queues are FIFO; an unsettled delivery that is dropped goes back to the front, marked redelivered.
//! - Prefetch is enforced per consumer with a semaphore; a permit lives as long as its delivery.
//! - `disconnect` invalidates every open handle so reconnect paths can be exercised.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::error::{BrokerError, BrokerResult};
use crate::{Broker, Consumer, Delivery, Publisher, Settle};

#[derive(Debug, Clone)]
struct Message {
    body: Vec<u8>,
    redelivered: bool,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<Message>,
    unacked: u32,
    acked: u64,
    rejected: Vec<Vec<u8>>,
}

#[derive(Debug, Default)]
struct State {
    queues: HashMap<String, QueueState>,
    generation: u64,
    refuse_connects: u32,
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<State>,
    notify: Notify,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Broker that keeps queues in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryBroker {
    shared: Arc<Shared>,
}

impl MemoryBroker {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ready plus unacknowledged messages in `queue`.
    #[must_use]
    pub fn pending(&self, queue: &str) -> u32 {
        let state = self.shared.lock();
        state.queues.get(queue).map_or(0, |q| {
            u32::try_from(q.ready.len())
                .unwrap_or(u32::MAX)
                .saturating_add(q.unacked)
        })
    }

    /// Messages acknowledged on `queue` so far.
    #[must_use]
    pub fn acked(&self, queue: &str) -> u64 {
        self.shared.lock().queues.get(queue).map_or(0, |q| q.acked)
    }

    /// Bodies rejected (and dropped) from `queue`.
    #[must_use]
    pub fn rejected(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map(|q| q.rejected.clone())
            .unwrap_or_default()
    }

    /// Bodies waiting in `queue`, oldest first.
    #[must_use]
    pub fn ready_bodies(&self, queue: &str) -> Vec<Vec<u8>> {
        self.shared
            .lock()
            .queues
            .get(queue)
            .map(|q| q.ready.iter().map(|m| m.body.clone()).collect())
            .unwrap_or_default()
    }

    /// Enqueue a raw body as if a publisher had sent it.
    pub fn inject(&self, queue: &str, body: impl Into<Vec<u8>>) {
        {
            let mut state = self.shared.lock();
            state
                .queues
                .entry(queue.to_string())
                .or_default()
                .ready
                .push_back(Message {
                    body: body.into(),
                    redelivered: false,
                });
        }
        self.shared.notify.notify_waiters();
    }

    /// Drop every open connection; in-flight deliveries return to their queues when dropped.
    pub fn disconnect(&self) {
        self.shared.lock().generation += 1;
        self.shared.notify.notify_waiters();
    }

    /// Make the next `count` connection attempts fail.
    pub fn refuse_connects(&self, count: u32) {
        self.shared.lock().refuse_connects = count;
    }

    fn connect(&self, queue: &str, operation: &'static str) -> BrokerResult<u64> {
        let mut state = self.shared.lock();
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(BrokerError::Closed { operation });
        }
        state.queues.entry(queue.to_string()).or_default();
        Ok(state.generation)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn open_publisher(&self, queue: &str) -> BrokerResult<Box<dyn Publisher>> {
        let generation = self.connect(queue, "memory.connect")?;
        Ok(Box::new(MemoryPublisher {
            shared: Arc::clone(&self.shared),
            queue: queue.to_string(),
            generation,
        }))
    }

    async fn open_consumer(&self, queue: &str, prefetch: u16) -> BrokerResult<Box<dyn Consumer>> {
        let generation = self.connect(queue, "memory.connect")?;
        Ok(Box::new(MemoryConsumer {
            shared: Arc::clone(&self.shared),
            queue: queue.to_string(),
            generation,
            permits: Arc::new(Semaphore::new(usize::from(prefetch.max(1)))),
        }))
    }
}

fn check_generation(state: &State, generation: u64, operation: &'static str) -> BrokerResult<()> {
    if state.generation == generation {
        Ok(())
    } else {
        Err(BrokerError::Closed { operation })
    }
}

struct MemoryPublisher {
    shared: Arc<Shared>,
    queue: String,
    generation: u64,
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&mut self, body: &[u8]) -> BrokerResult<()> {
        {
            let mut state = self.shared.lock();
            check_generation(&state, self.generation, "memory.publish")?;
            state
                .queues
                .entry(self.queue.clone())
                .or_default()
                .ready
                .push_back(Message {
                    body: body.to_vec(),
                    redelivered: false,
                });
        }
        self.shared.notify.notify_waiters();
        Ok(())
    }

    async fn pending(&mut self) -> BrokerResult<u32> {
        let state = self.shared.lock();
        check_generation(&state, self.generation, "memory.pending")?;
        Ok(state.queues.get(&self.queue).map_or(0, |q| {
            u32::try_from(q.ready.len())
                .unwrap_or(u32::MAX)
                .saturating_add(q.unacked)
        }))
    }

    async fn close(self: Box<Self>) -> BrokerResult<()> {
        Ok(())
    }
}

struct MemoryConsumer {
    shared: Arc<Shared>,
    queue: String,
    generation: u64,
    permits: Arc<Semaphore>,
}

impl MemoryConsumer {
    fn try_take(&self) -> BrokerResult<Option<Message>> {
        let mut state = self.shared.lock();
        check_generation(&state, self.generation, "memory.consume")?;
        let queue = state.queues.entry(self.queue.clone()).or_default();
        let message = queue.ready.pop_front();
        if message.is_some() {
            queue.unacked += 1;
        }
        Ok(message)
    }
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn next_delivery(&mut self) -> BrokerResult<Option<Delivery>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| BrokerError::Closed {
                operation: "memory.prefetch",
            })?;
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_take()? {
                let handle = MemorySettle {
                    shared: Arc::clone(&self.shared),
                    queue: self.queue.clone(),
                    body: Some(message.body.clone()),
                    _permit: permit,
                };
                return Ok(Some(Delivery::new(
                    message.body,
                    message.redelivered,
                    Box::new(handle),
                )));
            }
            notified.await;
        }
    }

    async fn close(self: Box<Self>) -> BrokerResult<()> {
        Ok(())
    }
}

struct MemorySettle {
    shared: Arc<Shared>,
    queue: String,
    body: Option<Vec<u8>>,
    _permit: OwnedSemaphorePermit,
}

impl MemorySettle {
    fn finish(&mut self, acked: bool) {
        let Some(body) = self.body.take() else {
            return;
        };
        let mut state = self.shared.lock();
        let queue = state.queues.entry(self.queue.clone()).or_default();
        queue.unacked = queue.unacked.saturating_sub(1);
        if acked {
            queue.acked += 1;
        } else {
            queue.rejected.push(body);
        }
    }
}

#[async_trait]
impl Settle for MemorySettle {
    async fn ack(self: Box<Self>) -> BrokerResult<()> {
        let mut this = self;
        this.finish(true);
        Ok(())
    }

    async fn reject(self: Box<Self>) -> BrokerResult<()> {
        let mut this = self;
        this.finish(false);
        Ok(())
    }
}

impl Drop for MemorySettle {
    fn drop(&mut self) {
        let Some(body) = self.body.take() else {
            return;
        };
        {
            let mut state = self.shared.lock();
            let queue = state.queues.entry(self.queue.clone()).or_default();
            queue.unacked = queue.unacked.saturating_sub(1);
            queue.ready.push_front(Message {
                body,
                redelivered: true,
            });
        }
        self.shared.notify.notify_waiters();
    }
}
