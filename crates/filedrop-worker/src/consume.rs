//! Delivery loop for the worker.
//!
//! # Design
//! - One consumer connection with prefetch [`PREFETCH_LIMIT`]; deliveries are
//!   processed strictly one after another.
//! - Cancellation is only observed while waiting for a delivery. A message that
//!   has been received is always processed and settled before the loop exits.
//! - A broken consumer stream is reopened with bounded backoff; exhausting it is fatal.

use std::sync::Arc;

use filedrop_broker::{BackoffPolicy, Broker, BrokerError, Consumer, Delivery};
use filedrop_core::{PREFETCH_LIMIT, ProcessingOutcome};
use filedrop_telemetry::Metrics;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{WorkerError, WorkerResult};
use crate::process::MessageProcessor;

/// Counts reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumeSummary {
    /// Deliveries acknowledged.
    pub processed: u64,
    /// Deliveries rejected.
    pub rejected: u64,
}

/// Wiring for the delivery loop.
pub struct ConsumeLoop {
    broker: Arc<dyn Broker>,
    queue: String,
    backoff: BackoffPolicy,
    processor: MessageProcessor,
    metrics: Metrics,
}

impl ConsumeLoop {
    /// Build a loop consuming `queue` on `broker`.
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        queue: impl Into<String>,
        backoff: BackoffPolicy,
        processor: MessageProcessor,
        metrics: Metrics,
    ) -> Self {
        Self {
            broker,
            queue: queue.into(),
            backoff,
            processor,
            metrics,
        }
    }

    /// Consume until cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Broker`] when the broker stays unreachable after
    /// the configured reconnect attempts.
    pub async fn run(&self, cancel: &CancellationToken) -> WorkerResult<ConsumeSummary> {
        let mut summary = ConsumeSummary::default();
        let Some(mut consumer) = self.connect(cancel).await? else {
            return Ok(summary);
        };
        info!(queue = %self.queue, prefetch = PREFETCH_LIMIT, "worker ready");

        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = consumer.next_delivery() => next,
            };

            match next {
                Ok(Some(delivery)) => match self.handle(delivery).await {
                    ProcessingOutcome::Processed { .. } => summary.processed += 1,
                    ProcessingOutcome::Rejected { .. } => summary.rejected += 1,
                },
                Ok(None) => {
                    warn!("consumer stream ended; reconnecting");
                    let Some(fresh) = self.reopen(consumer, cancel).await? else {
                        return Ok(self.stopped(summary));
                    };
                    consumer = fresh;
                }
                Err(err) => {
                    warn!(error = %err, "consumer failed; reconnecting");
                    let Some(fresh) = self.reopen(consumer, cancel).await? else {
                        return Ok(self.stopped(summary));
                    };
                    consumer = fresh;
                }
            }
        }

        if let Err(err) = consumer.close().await {
            warn!(error = %err, "failed to close broker connection");
        }
        Ok(self.stopped(summary))
    }

    /// Process one delivery and settle it.
    async fn handle(&self, delivery: Delivery) -> ProcessingOutcome {
        let outcome = self.processor.process(&delivery.body).await;
        self.metrics.inc_settled(outcome.label());

        let settled = if outcome.should_ack() {
            delivery.ack().await
        } else {
            delivery.reject().await
        };
        match &outcome {
            ProcessingOutcome::Processed { destination } => {
                info!(destination = %destination.display(), "processed");
            }
            ProcessingOutcome::Rejected { error } => {
                warn!(reason = error.kind(), error = %error, "rejected");
            }
        }
        if let Err(err) = settled {
            warn!(outcome = outcome.label(), error = %err, "failed to settle delivery");
        }
        outcome
    }

    async fn reopen(
        &self,
        broken: Box<dyn Consumer>,
        cancel: &CancellationToken,
    ) -> WorkerResult<Option<Box<dyn Consumer>>> {
        if let Err(err) = broken.close().await {
            warn!(error = %err, "failed to close broken consumer");
        }
        let fresh = self.connect(cancel).await?;
        if fresh.is_some() {
            self.metrics.inc_reconnect();
        }
        Ok(fresh)
    }

    /// Open a consumer, returning `None` if shutdown started while retrying.
    async fn connect(&self, cancel: &CancellationToken) -> WorkerResult<Option<Box<dyn Consumer>>> {
        let opened = self
            .backoff
            .retry("consumer.connect", cancel, || {
                self.broker.open_consumer(&self.queue, PREFETCH_LIMIT)
            })
            .await;
        match opened {
            Ok(consumer) => Ok(Some(consumer)),
            Err(BrokerError::Cancelled) => Ok(None),
            Err(err) => Err(WorkerError::broker("consumer.connect", err)),
        }
    }

    fn stopped(&self, summary: ConsumeSummary) -> ConsumeSummary {
        info!(
            queue = %self.queue,
            processed = summary.processed,
            rejected = summary.rejected,
            "worker stopped"
        );
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use filedrop_broker::MemoryBroker;
    use filedrop_core::FileDescriptor;
    use filedrop_data::{DataResult, MetadataStore, NoopMetadataStore};
    use filedrop_test_support::{InboxFixture, eventually};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowStore {
        started: AtomicBool,
    }

    #[async_trait]
    impl MetadataStore for SlowStore {
        async fn record(&self, _descriptor: &FileDescriptor) -> DataResult<()> {
            self.started.store(true, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(300)).await;
            Ok(())
        }
    }

    const QUEUE: &str = "import_queue";

    fn consume_loop(fixture: &InboxFixture, broker: &MemoryBroker, metrics: &Metrics) -> ConsumeLoop {
        ConsumeLoop::new(
            Arc::new(broker.clone()),
            QUEUE,
            BackoffPolicy {
                initial: Duration::from_millis(1),
                max_attempts: 3,
            },
            MessageProcessor::new(fixture.layout(), Arc::new(NoopMetadataStore)),
            metrics.clone(),
        )
    }

    #[tokio::test]
    async fn settles_each_delivery_then_stops_on_cancel() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let good = fixture.descriptor_for("a.txt", b"abc")?;
        let broker = MemoryBroker::new();
        broker.inject(QUEUE, good.encode()?);
        broker.inject(QUEUE, b"garbage".to_vec());
        let metrics = Metrics::new()?;
        let consume = consume_loop(&fixture, &broker, &metrics);

        let cancel = CancellationToken::new();
        let run = consume.run(&cancel);
        let driver = async {
            eventually("both settled", Duration::from_secs(5), || {
                broker.acked(QUEUE) == 1 && broker.rejected(QUEUE).len() == 1
            })
            .await?;
            cancel.cancel();
            anyhow::Ok(())
        };
        let (summary, driven) = tokio::join!(run, driver);
        driven?;
        assert_eq!(
            summary?,
            ConsumeSummary {
                processed: 1,
                rejected: 1
            }
        );
        assert_eq!(broker.pending(QUEUE), 0);
        assert_eq!(broker.rejected(QUEUE), vec![b"garbage".to_vec()]);
        assert_eq!(metrics.settled("processed"), 1);
        assert_eq!(metrics.settled("rejected"), 1);
        assert_eq!(
            InboxFixture::names_in(&fixture.layout().processed)?,
            vec!["a.txt".to_string()]
        );
        Ok(())
    }

    #[tokio::test]
    async fn reconnects_after_the_broker_drops_the_connection() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let first = fixture.descriptor_for("one.txt", b"1")?;
        let second = fixture.descriptor_for("two.txt", b"2")?;
        let broker = MemoryBroker::new();
        let metrics = Metrics::new()?;
        let consume = consume_loop(&fixture, &broker, &metrics);

        let cancel = CancellationToken::new();
        let run = consume.run(&cancel);
        let driver = async {
            broker.inject(QUEUE, first.encode()?);
            eventually("first ack", Duration::from_secs(5), || broker.acked(QUEUE) == 1).await?;
            broker.disconnect();
            broker.inject(QUEUE, second.encode()?);
            eventually("second ack", Duration::from_secs(5), || broker.acked(QUEUE) == 2).await?;
            cancel.cancel();
            anyhow::Ok(())
        };
        let (summary, driven) = tokio::join!(run, driver);
        driven?;
        assert_eq!(summary?.processed, 2);
        assert!(metrics.snapshot().broker_reconnects_total >= 1);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_broker_is_fatal() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let broker = MemoryBroker::new();
        broker.refuse_connects(10);
        let metrics = Metrics::new()?;

        let result = consume_loop(&fixture, &broker, &metrics)
            .run(&CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(WorkerError::Broker {
                operation: "consumer.connect",
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_before_any_delivery_exits_cleanly() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let broker = MemoryBroker::new();
        let metrics = Metrics::new()?;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let summary = consume_loop(&fixture, &broker, &metrics).run(&cancel).await?;
        assert_eq!(summary, ConsumeSummary::default());
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_waits_for_the_delivery_in_progress() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let descriptor = fixture.descriptor_for("slow.txt", b"abc")?;
        let broker = MemoryBroker::new();
        broker.inject(QUEUE, descriptor.encode()?);
        let metrics = Metrics::new()?;
        let store = Arc::new(SlowStore::default());
        let consume = ConsumeLoop::new(
            Arc::new(broker.clone()),
            QUEUE,
            BackoffPolicy::default(),
            MessageProcessor::new(fixture.layout(), store.clone()),
            metrics.clone(),
        );

        let cancel = CancellationToken::new();
        let run = consume.run(&cancel);
        let driver = async {
            eventually("store write started", Duration::from_secs(5), || {
                store.started.load(Ordering::SeqCst)
            })
            .await?;
            cancel.cancel();
            anyhow::Ok(())
        };
        let (summary, driven) = tokio::join!(run, driver);
        driven?;

        assert_eq!(summary?.processed, 1);
        assert_eq!(broker.acked(QUEUE), 1);
        assert_eq!(broker.pending(QUEUE), 0);
        assert_eq!(
            InboxFixture::names_in(&fixture.layout().processed)?,
            vec!["slow.txt".to_string()]
        );
        Ok(())
    }
}
