//! Ingest loop: stability check, fingerprint, publish.
//!
//! # Design
//! - Candidates are handled one at a time in arrival order; a failing file is
//!   logged, counted, and skipped.
//! - Cancellation stops intake only. The path already dequeued runs to completion:
//!   its stability wait is bounded by the settle timeout, not by shutdown.
//! - A publish failure drops the connection, reconnects with bounded backoff,
//!   and retries the same descriptor once. Exhausting the backoff is fatal.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use filedrop_broker::{BackoffPolicy, Broker, BrokerError, Publisher};
use filedrop_core::{FileDescriptor, IngestError, IngestResult};
use filedrop_fsops::{Fingerprinter, StabilityDetector, StabilityPolicy};
use filedrop_telemetry::Metrics;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::{WatcherError, WatcherResult};

/// Counts reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Descriptors published.
    pub published: u64,
    /// Candidates dropped before publishing.
    pub abandoned: u64,
}

/// Wiring for the ingest loop.
pub struct IngestPipeline {
    detector: StabilityDetector,
    fingerprinter: Fingerprinter,
    broker: Arc<dyn Broker>,
    queue: String,
    backoff: BackoffPolicy,
    metrics: Metrics,
}

impl IngestPipeline {
    /// Build a pipeline publishing to `queue` on `broker`.
    #[must_use]
    pub fn new(
        broker: Arc<dyn Broker>,
        queue: impl Into<String>,
        stability: StabilityPolicy,
        backoff: BackoffPolicy,
        metrics: Metrics,
    ) -> Self {
        Self {
            detector: StabilityDetector::new(stability),
            fingerprinter: Fingerprinter::new(),
            broker,
            queue: queue.into(),
            backoff,
            metrics,
        }
    }

    /// Drain `candidates` until cancellation or until the sending side closes.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Broker`] when the broker stays unreachable after
    /// the configured reconnect attempts.
    pub async fn run(
        &self,
        candidates: &mut mpsc::Receiver<PathBuf>,
        cancel: &CancellationToken,
    ) -> WatcherResult<RunSummary> {
        let mut publisher = match self.connect(cancel).await {
            Ok(publisher) => publisher,
            Err(BrokerError::Cancelled) => return Ok(RunSummary::default()),
            Err(err) => return Err(WatcherError::broker("publisher.connect", err)),
        };
        info!(queue = %self.queue, "watcher ready");

        let mut summary = RunSummary::default();
        loop {
            let path = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                next = candidates.recv() => match next {
                    Some(path) => path,
                    None => break,
                },
            };

            match self.ingest(&path, &mut publisher).await {
                Ok(descriptor) => {
                    summary.published += 1;
                    self.metrics.inc_published();
                    info!(
                        path = %descriptor.path().display(),
                        size = descriptor.size_bytes,
                        content_hash = %descriptor.content_hash,
                        "published"
                    );
                }
                Err(IngestError::BrokerUnavailable { operation, source }) => {
                    if let Err(err) = publisher.close().await {
                        warn!(error = %err, "failed to close broker connection");
                    }
                    return Err(WatcherError::broker(
                        operation,
                        BrokerError::Operation { operation, source },
                    ));
                }
                Err(err) => {
                    summary.abandoned += 1;
                    self.metrics.inc_abandoned(err.kind());
                    warn!(
                        path = %path.display(),
                        reason = err.kind(),
                        error = %err,
                        "candidate abandoned"
                    );
                }
            }
        }

        if let Err(err) = publisher.close().await {
            warn!(error = %err, "failed to close broker connection");
        }
        info!(
            published = summary.published,
            abandoned = summary.abandoned,
            "watcher stopped"
        );
        Ok(summary)
    }

    /// Run one candidate through stability, fingerprint, and publish.
    async fn ingest(
        &self,
        path: &Path,
        publisher: &mut Box<dyn Publisher>,
    ) -> IngestResult<FileDescriptor> {
        self.metrics.add_inflight(1);
        let result = self.ingest_inner(path, publisher).await;
        self.metrics.add_inflight(-1);
        result
    }

    async fn ingest_inner(
        &self,
        path: &Path,
        publisher: &mut Box<dyn Publisher>,
    ) -> IngestResult<FileDescriptor> {
        // A dequeued path finishes even during shutdown; otherwise it would stay in the inbox unseen.
        self.detector
            .wait_until_stable(path, &CancellationToken::new())
            .await?;

        let started = Instant::now();
        let descriptor = self.fingerprinter.fingerprint(path).await?;
        self.metrics.observe_fingerprint(started.elapsed());

        let body = descriptor.encode()?;
        self.publish(publisher, &body).await?;
        Ok(descriptor)
    }

    async fn publish(&self, publisher: &mut Box<dyn Publisher>, body: &[u8]) -> IngestResult<()> {
        let Err(first) = publisher.publish(body).await else {
            return Ok(());
        };
        warn!(error = %first, queue = %self.queue, "publish failed; reconnecting");

        let mut fresh = self
            .connect(&CancellationToken::new())
            .await
            .map_err(IngestError::from)?;
        self.metrics.inc_reconnect();
        fresh.publish(body).await.map_err(IngestError::from)?;
        let stale = std::mem::replace(publisher, fresh);
        if let Err(err) = stale.close().await {
            warn!(error = %err, "failed to close stale broker connection");
        }
        Ok(())
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<Box<dyn Publisher>, BrokerError> {
        self.backoff
            .retry("publisher.connect", cancel, || {
                self.broker.open_publisher(&self.queue)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use filedrop_broker::MemoryBroker;
    use filedrop_test_support::InboxFixture;
    use std::time::Duration;

    const QUEUE: &str = "import_queue";
    const ABC_SHA256: &str = "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad";

    fn pipeline(broker: &MemoryBroker, metrics: &Metrics) -> IngestPipeline {
        IngestPipeline::new(
            Arc::new(broker.clone()),
            QUEUE,
            StabilityPolicy {
                delay: Duration::from_millis(5),
                checks: 2,
                settle_timeout: Duration::from_secs(5),
            },
            BackoffPolicy {
                initial: Duration::from_millis(1),
                max_attempts: 3,
            },
            metrics.clone(),
        )
    }

    #[tokio::test]
    async fn stable_file_is_published_with_sorted_descriptor() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let path = fixture.drop_file("hello.txt", b"abc")?;
        let broker = MemoryBroker::new();
        let metrics = Metrics::new()?;

        let (sender, mut receiver) = mpsc::channel(4);
        sender.send(path.clone()).await?;
        drop(sender);

        let summary = pipeline(&broker, &metrics)
            .run(&mut receiver, &CancellationToken::new())
            .await?;
        assert_eq!(
            summary,
            RunSummary {
                published: 1,
                abandoned: 0
            }
        );

        let bodies = broker.ready_bodies(QUEUE);
        assert_eq!(bodies.len(), 1);
        let text = String::from_utf8(bodies[0].clone())?;
        assert!(text.starts_with(&format!(r#"{{"content_hash":"{ABC_SHA256}","modified_at":"#)));
        assert!(text.ends_with(r#","size":3}"#));
        let descriptor = FileDescriptor::decode(&bodies[0])?;
        assert_eq!(descriptor.path(), std::fs::canonicalize(&path)?);
        assert_eq!(metrics.snapshot().files_published_total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn vanished_candidate_does_not_stop_the_loop() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let ghost = fixture.layout().inbox.join("ghost.bin");
        let real = fixture.drop_file("real.bin", b"payload")?;
        let broker = MemoryBroker::new();
        let metrics = Metrics::new()?;

        let (sender, mut receiver) = mpsc::channel(4);
        sender.send(ghost).await?;
        sender.send(real).await?;
        drop(sender);

        let summary = pipeline(&broker, &metrics)
            .run(&mut receiver, &CancellationToken::new())
            .await?;
        assert_eq!(summary.published, 1);
        assert_eq!(summary.abandoned, 1);
        assert_eq!(metrics.abandoned("transient_io"), 1);
        assert_eq!(broker.pending(QUEUE), 1);
        Ok(())
    }

    #[tokio::test]
    async fn publish_reconnects_after_connection_loss() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let first = fixture.drop_file("one.txt", b"1")?;
        let second = fixture.drop_file("two.txt", b"22")?;
        let broker = MemoryBroker::new();
        let metrics = Metrics::new()?;
        let pipeline = pipeline(&broker, &metrics);

        let (sender, mut receiver) = mpsc::channel(4);
        let cancel = CancellationToken::new();
        let run = {
            let cancel = cancel.clone();
            async move { pipeline.run(&mut receiver, &cancel).await }
        };
        let driver = async {
            sender.send(first).await?;
            filedrop_test_support::eventually("first publish", Duration::from_secs(5), || {
                broker.pending(QUEUE) == 1
            })
            .await?;
            broker.disconnect();
            sender.send(second).await?;
            filedrop_test_support::eventually("second publish", Duration::from_secs(5), || {
                broker.pending(QUEUE) == 2
            })
            .await?;
            drop(sender);
            anyhow::Ok(())
        };
        let (summary, driven) = tokio::join!(run, driver);
        driven?;
        assert_eq!(summary?.published, 2);
        assert_eq!(metrics.snapshot().broker_reconnects_total, 1);
        Ok(())
    }

    #[tokio::test]
    async fn unreachable_broker_is_fatal() -> Result<()> {
        let broker = MemoryBroker::new();
        broker.refuse_connects(10);
        let metrics = Metrics::new()?;
        let (_sender, mut receiver) = mpsc::channel::<PathBuf>(1);

        let result = pipeline(&broker, &metrics)
            .run(&mut receiver, &CancellationToken::new())
            .await;
        assert!(matches!(
            result,
            Err(WatcherError::Broker {
                source: BrokerError::Exhausted { attempts: 3, .. },
                ..
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn cancellation_stops_an_idle_loop() -> Result<()> {
        let broker = MemoryBroker::new();
        let metrics = Metrics::new()?;
        let (_sender, mut receiver) = mpsc::channel::<PathBuf>(1);
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline(&broker, &metrics).run(&mut receiver, &cancel),
        )
        .await??;
        assert_eq!(summary, RunSummary::default());
        Ok(())
    }

    #[tokio::test]
    async fn shutdown_lets_the_dequeued_file_finish() -> Result<()> {
        let fixture = InboxFixture::new()?;
        let path = fixture.drop_file("hello.txt", b"abc")?;
        let broker = MemoryBroker::new();
        let metrics = Metrics::new()?;
        let pipeline = IngestPipeline::new(
            Arc::new(broker.clone()),
            QUEUE,
            StabilityPolicy {
                delay: Duration::from_millis(200),
                checks: 3,
                settle_timeout: Duration::from_secs(5),
            },
            BackoffPolicy::default(),
            metrics.clone(),
        );

        let (sender, mut receiver) = mpsc::channel(4);
        sender.send(path).await?;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let summary = tokio::time::timeout(
            Duration::from_secs(5),
            pipeline.run(&mut receiver, &cancel),
        )
        .await??;
        assert_eq!(
            summary,
            RunSummary {
                published: 1,
                abandoned: 0
            }
        );
        assert!(cancel.is_cancelled());
        assert_eq!(broker.pending(QUEUE), 1);
        assert_eq!(metrics.abandoned("cancelled"), 0);
        drop(sender);
        Ok(())
    }
}
