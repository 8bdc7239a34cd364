#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::cargo,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions, clippy::multiple_crate_versions)]

//! Durable work-queue seam between the watcher and the worker.
//!
//! # Design
//! - [`Broker`] opens publishers and consumers against a named durable queue.
//! - Every [`Delivery`] must be settled exactly once; dropping it unsettled
//!   hands the message back to the broker for redelivery.
//! - Rejection never requeues.
//! - `amqp` speaks AMQP 0-9-1 through `lapin`; `memory` is an in-process test double.

pub mod amqp;
pub mod backoff;
pub mod error;
pub mod memory;

use async_trait::async_trait;

pub use amqp::AmqpBroker;
pub use backoff::BackoffPolicy;
pub use error::{BrokerError, BrokerResult};
pub use memory::MemoryBroker;

/// Factory for queue handles.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Connect and declare `queue` as durable, returning a publishing handle.
    async fn open_publisher(&self, queue: &str) -> BrokerResult<Box<dyn Publisher>>;

    /// Connect, declare `queue` as durable, and start consuming with at most
    /// `prefetch` unsettled deliveries outstanding.
    async fn open_consumer(&self, queue: &str, prefetch: u16) -> BrokerResult<Box<dyn Consumer>>;
}

/// Publishing side of a queue.
#[async_trait]
pub trait Publisher: Send {
    /// Publish a persistent JSON message and wait for the broker to accept it.
    async fn publish(&mut self, body: &[u8]) -> BrokerResult<()>;

    /// Messages currently held by the queue (ready plus unacknowledged where known).
    async fn pending(&mut self) -> BrokerResult<u32>;

    /// Close the underlying connection.
    async fn close(self: Box<Self>) -> BrokerResult<()>;
}

/// Consuming side of a queue.
#[async_trait]
pub trait Consumer: Send {
    /// Wait for the next delivery.
    ///
    /// Returns `Ok(None)` when the broker ends the stream. Implementations
    /// must be cancel-safe so callers can race this against shutdown.
    async fn next_delivery(&mut self) -> BrokerResult<Option<Delivery>>;

    /// Close the underlying connection.
    async fn close(self: Box<Self>) -> BrokerResult<()>;
}

/// Settlement half of a delivery, implemented per broker.
#[async_trait]
pub trait Settle: Send {
    /// Acknowledge successful processing.
    async fn ack(self: Box<Self>) -> BrokerResult<()>;

    /// Reject the message without requeue.
    async fn reject(self: Box<Self>) -> BrokerResult<()>;
}

/// A message handed to a consumer together with its settlement handle.
pub struct Delivery {
    /// Raw message body.
    pub body: Vec<u8>,
    /// Whether the broker has delivered this message before.
    pub redelivered: bool,
    handle: Box<dyn Settle>,
}

impl Delivery {
    /// Pair a body with the handle that settles it.
    #[must_use]
    pub fn new(body: Vec<u8>, redelivered: bool, handle: Box<dyn Settle>) -> Self {
        Self {
            body,
            redelivered,
            handle,
        }
    }

    /// Acknowledge the delivery.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] if the channel is no longer usable.
    pub async fn ack(self) -> BrokerResult<()> {
        self.handle.ack().await
    }

    /// Reject the delivery without requeue.
    ///
    /// # Errors
    ///
    /// Returns a [`BrokerError`] if the channel is no longer usable.
    pub async fn reject(self) -> BrokerResult<()> {
        self.handle.reject().await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("body_len", &self.body.len())
            .field("redelivered", &self.redelivered)
            .finish_non_exhaustive()
    }
}
