//! Prometheus-backed pipeline counters and snapshot helpers.
//!
//! # Design
//! - Encapsulates collector registration to keep the public API small.
//! - Label values come from fixed taxonomies (error kinds, settlement outcomes).

use std::convert::TryFrom;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use serde::Serialize;

/// Prometheus registry shared by the watcher and worker.
#[derive(Clone)]
pub struct Metrics {
    inner: Arc<MetricsInner>,
}

struct MetricsInner {
    registry: Registry,
    files_published_total: IntCounter,
    candidates_abandoned_total: IntCounterVec,
    messages_settled_total: IntCounterVec,
    broker_reconnects_total: IntCounter,
    inflight_candidates: IntGauge,
    last_fingerprint_ms: IntGauge,
}

/// Snapshot of the scalar counters, for logs and tests.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Descriptors published to the queue.
    pub files_published_total: u64,
    /// Broker reconnects performed.
    pub broker_reconnects_total: u64,
    /// Candidates currently being settled or fingerprinted.
    pub inflight_candidates: i64,
    /// Duration of the most recent fingerprint (ms).
    pub last_fingerprint_ms: i64,
}

impl Metrics {
    /// Construct a registry with the pipeline collectors registered.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the Prometheus collectors cannot be
    /// registered.
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let files_published_total = IntCounter::with_opts(Opts::new(
            "filedrop_files_published_total",
            "File descriptors published to the work queue",
        ))?;
        let candidates_abandoned_total = IntCounterVec::new(
            Opts::new(
                "filedrop_candidates_abandoned_total",
                "Inbox candidates dropped before publishing, by reason",
            ),
            &["reason"],
        )?;
        let messages_settled_total = IntCounterVec::new(
            Opts::new(
                "filedrop_messages_settled_total",
                "Messages settled by the worker, by outcome",
            ),
            &["outcome"],
        )?;
        let broker_reconnects_total = IntCounter::with_opts(Opts::new(
            "filedrop_broker_reconnects_total",
            "Broker connections re-established after a failure",
        ))?;
        let inflight_candidates = IntGauge::with_opts(Opts::new(
            "filedrop_inflight_candidates",
            "Candidates currently in the stability or fingerprint stage",
        ))?;
        let last_fingerprint_ms = IntGauge::with_opts(Opts::new(
            "filedrop_last_fingerprint_ms",
            "Time taken by the most recent fingerprint (ms)",
        ))?;

        registry.register(Box::new(files_published_total.clone()))?;
        registry.register(Box::new(candidates_abandoned_total.clone()))?;
        registry.register(Box::new(messages_settled_total.clone()))?;
        registry.register(Box::new(broker_reconnects_total.clone()))?;
        registry.register(Box::new(inflight_candidates.clone()))?;
        registry.register(Box::new(last_fingerprint_ms.clone()))?;

        Ok(Self {
            inner: Arc::new(MetricsInner {
                registry,
                files_published_total,
                candidates_abandoned_total,
                messages_settled_total,
                broker_reconnects_total,
                inflight_candidates,
                last_fingerprint_ms,
            }),
        })
    }

    /// Count one published descriptor.
    pub fn inc_published(&self) {
        self.inner.files_published_total.inc();
    }

    /// Count one abandoned candidate, labelled with the error kind.
    pub fn inc_abandoned(&self, reason: &str) {
        self.inner
            .candidates_abandoned_total
            .with_label_values(&[reason])
            .inc();
    }

    /// Count one settled message (`processed` or `rejected`).
    pub fn inc_settled(&self, outcome: &str) {
        self.inner
            .messages_settled_total
            .with_label_values(&[outcome])
            .inc();
    }

    /// Count one successful broker reconnect.
    pub fn inc_reconnect(&self) {
        self.inner.broker_reconnects_total.inc();
    }

    /// Adjust the in-flight candidate gauge.
    pub fn add_inflight(&self, delta: i64) {
        self.inner.inflight_candidates.add(delta);
    }

    /// Record how long the last fingerprint took.
    pub fn observe_fingerprint(&self, duration: Duration) {
        self.inner
            .last_fingerprint_ms
            .set(Self::duration_to_ms(duration));
    }

    /// Current value of a labelled abandonment counter.
    #[must_use]
    pub fn abandoned(&self, reason: &str) -> u64 {
        self.inner
            .candidates_abandoned_total
            .with_label_values(&[reason])
            .get()
    }

    /// Current value of a labelled settlement counter.
    #[must_use]
    pub fn settled(&self, outcome: &str) -> u64 {
        self.inner
            .messages_settled_total
            .with_label_values(&[outcome])
            .get()
    }

    /// Render the metrics registry using the Prometheus text exposition format.
    ///
    /// # Errors
    ///
    /// Returns an error if the metrics cannot be encoded or if the encoded
    /// buffer is not valid UTF-8.
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.inner.registry.gather();
        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .context("failed to encode Prometheus metrics")?;
        String::from_utf8(buffer).context("metrics output was not valid UTF-8")
    }

    /// Take a point-in-time snapshot of the scalar collectors.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            files_published_total: self.inner.files_published_total.get(),
            broker_reconnects_total: self.inner.broker_reconnects_total.get(),
            inflight_candidates: self.inner.inflight_candidates.get(),
            last_fingerprint_ms: self.inner.last_fingerprint_ms.get(),
        }
    }

    /// Convert a duration to milliseconds saturating at `i64::MAX`.
    pub(crate) fn duration_to_ms(duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }
}
