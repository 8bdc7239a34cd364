//! Process wiring for the worker binary.

use std::sync::Arc;

use clap::Parser;
use filedrop_broker::{AmqpBroker, Broker, amqp::redact};
use filedrop_config::{WorkerArgs, WorkerSettings};
use filedrop_core::shutdown_token;
use filedrop_data::{MetadataStore, NoopMetadataStore, PgMetadataStore};
use filedrop_telemetry::{LoggingConfig, Metrics, build_sha, init_logging};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::consume::{ConsumeLoop, ConsumeSummary};
use crate::error::{WorkerError, WorkerResult};
use crate::process::MessageProcessor;

/// Dependencies required to run the worker.
pub struct WorkerDependencies {
    /// Validated settings.
    pub settings: WorkerSettings,
    /// Broker the descriptors are consumed from.
    pub broker: Arc<dyn Broker>,
    /// Metadata store, inert when no database is configured.
    pub store: Arc<dyn MetadataStore>,
    /// Metrics registry.
    pub metrics: Metrics,
    /// Shutdown trigger.
    pub cancel: CancellationToken,
}

impl WorkerDependencies {
    /// Production dependencies: AMQP broker, Postgres store when configured,
    /// and a signal-driven shutdown token.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::MetadataStore`] if a configured database cannot be
    /// reached or migrated, and [`WorkerError::Telemetry`] if metrics cannot be built.
    pub async fn production(settings: WorkerSettings) -> WorkerResult<Self> {
        let store: Arc<dyn MetadataStore> = match settings.database_url.as_deref() {
            Some(url) => Arc::new(PgMetadataStore::connect(url).await.map_err(|source| {
                WorkerError::MetadataStore {
                    operation: "metadata_store.connect",
                    source,
                }
            })?),
            None => Arc::new(NoopMetadataStore),
        };
        let broker: Arc<dyn Broker> = Arc::new(AmqpBroker::new(settings.broker.amqp_url.clone()));
        let metrics = Metrics::new().map_err(|err| WorkerError::telemetry("metrics.new", err))?;
        Ok(Self {
            settings,
            broker,
            store,
            metrics,
            cancel: shutdown_token(),
        })
    }
}

/// Entry point for the worker binary: parse arguments, install logging, consume until shutdown.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the metadata store cannot be
/// opened, or the broker stays unreachable.
pub async fn run_worker() -> WorkerResult<()> {
    let settings = WorkerSettings::try_from(WorkerArgs::parse())?;
    init_logging(&LoggingConfig {
        level: &settings.log.level,
        format: settings.log.format,
        build_sha: build_sha(),
    })
    .map_err(|err| WorkerError::telemetry("telemetry.init", err))?;

    let result = match WorkerDependencies::production(settings).await {
        Ok(dependencies) => run_worker_with(dependencies).await.map(|_| ()),
        Err(err) => Err(err),
    };
    if let Err(err) = &result {
        error!(error = %err, "worker stopped on fatal error");
    }
    result
}

/// Boot sequence that relies entirely on injected dependencies.
///
/// # Errors
///
/// Returns [`WorkerError::Layout`] if the directories cannot be created and
/// [`WorkerError::Broker`] when the broker stays unreachable.
pub async fn run_worker_with(dependencies: WorkerDependencies) -> WorkerResult<ConsumeSummary> {
    let WorkerDependencies {
        settings,
        broker,
        store,
        metrics,
        cancel,
    } = dependencies;

    settings
        .layout
        .ensure()
        .map_err(|source| WorkerError::Layout {
            operation: "layout.ensure",
            source,
        })?;
    info!(
        inbox = %settings.layout.inbox.display(),
        processed = %settings.layout.processed.display(),
        queue = %settings.broker.queue,
        amqp_url = %redact(&settings.broker.amqp_url),
        build_sha = build_sha(),
        "worker starting"
    );

    let processor = MessageProcessor::new(&settings.layout, store);
    ConsumeLoop::new(
        broker,
        settings.broker.queue.clone(),
        settings.broker.backoff,
        processor,
        metrics,
    )
    .run(&cancel)
    .await
}
