//! Process wiring for the watcher binary.

use std::sync::Arc;

use clap::Parser;
use filedrop_broker::{AmqpBroker, Broker, amqp::redact};
use filedrop_config::{WatcherArgs, WatcherSettings};
use filedrop_core::shutdown_token;
use filedrop_telemetry::{LoggingConfig, Metrics, build_sha, init_logging};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::{WatcherError, WatcherResult};
use crate::pipeline::{IngestPipeline, RunSummary};
use crate::source::EventSource;

/// Dependencies required to run the watcher.
pub struct WatcherDependencies {
    /// Validated settings.
    pub settings: WatcherSettings,
    /// Broker the descriptors are published to.
    pub broker: Arc<dyn Broker>,
    /// Metrics registry.
    pub metrics: Metrics,
    /// Shutdown trigger.
    pub cancel: CancellationToken,
}

impl WatcherDependencies {
    /// Production dependencies: AMQP broker and a signal-driven shutdown token.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError::Telemetry`] if the metrics registry cannot be built.
    pub fn production(settings: WatcherSettings) -> WatcherResult<Self> {
        let broker: Arc<dyn Broker> = Arc::new(AmqpBroker::new(settings.broker.amqp_url.clone()));
        let metrics = Metrics::new().map_err(|err| WatcherError::telemetry("metrics.new", err))?;
        Ok(Self {
            settings,
            broker,
            metrics,
            cancel: shutdown_token(),
        })
    }
}

/// Entry point for the watcher binary: parse arguments, install logging, run until shutdown.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the inbox cannot be watched,
/// or the broker stays unreachable.
pub async fn run_watcher() -> WatcherResult<()> {
    let settings = WatcherSettings::try_from(WatcherArgs::parse())?;
    init_logging(&LoggingConfig {
        level: &settings.log.level,
        format: settings.log.format,
        build_sha: build_sha(),
    })
    .map_err(|err| WatcherError::telemetry("telemetry.init", err))?;

    let dependencies = WatcherDependencies::production(settings)?;
    match run_watcher_with(dependencies).await {
        Ok(_) => Ok(()),
        Err(err) => {
            error!(error = %err, "watcher stopped on fatal error");
            Err(err)
        }
    }
}

/// Boot sequence that relies entirely on injected dependencies.
///
/// # Errors
///
/// Returns [`WatcherError::Layout`] if the directories cannot be created,
/// [`WatcherError::Watch`] if the inbox cannot be subscribed, and
/// [`WatcherError::Broker`] when the broker stays unreachable.
pub async fn run_watcher_with(dependencies: WatcherDependencies) -> WatcherResult<RunSummary> {
    let WatcherDependencies {
        settings,
        broker,
        metrics,
        cancel,
    } = dependencies;

    settings
        .layout
        .ensure()
        .map_err(|source| WatcherError::Layout {
            operation: "layout.ensure",
            source,
        })?;
    info!(
        inbox = %settings.layout.inbox.display(),
        queue = %settings.broker.queue,
        amqp_url = %redact(&settings.broker.amqp_url),
        build_sha = build_sha(),
        "watcher starting"
    );

    let (source, mut candidates) =
        EventSource::start(&settings.layout.inbox, settings.event_capacity)?;
    if settings.scan_existing {
        match settings.layout.existing_candidates() {
            Ok(existing) => {
                info!(count = existing.len(), "queueing files already in the inbox");
                source.seed(existing);
            }
            Err(err) => warn!(error = %err, "failed to scan inbox for existing files"),
        }
    }

    let pipeline = IngestPipeline::new(
        broker,
        settings.broker.queue.clone(),
        settings.stability,
        settings.broker.backoff,
        metrics,
    );
    let summary = pipeline.run(&mut candidates, &cancel).await;
    drop(source);
    summary
}
