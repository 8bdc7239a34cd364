//! Typed, validated settings derived from [`crate::args`].
//!
//! # Design
//! - Validation happens once at startup; downstream code only sees typed values.
//! - Each failure names the offending field so operators can fix the right flag.

use std::time::Duration;

use filedrop_broker::BackoffPolicy;
use filedrop_fsops::{DirectoryLayout, StabilityPolicy};
use filedrop_telemetry::LogFormat;

use crate::args::{CommonArgs, WatcherArgs, WorkerArgs};
use crate::error::{ConfigError, ConfigResult};

/// Broker target and reconnect schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerSettings {
    /// Connection URI.
    pub amqp_url: String,
    /// Durable queue name.
    pub queue: String,
    /// Reconnect schedule.
    pub backoff: BackoffPolicy,
}

/// Logging level and format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Level used when `RUST_LOG` is unset.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Settings for the watcher process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    /// Inbox and terminal directories.
    pub layout: DirectoryLayout,
    /// Broker target.
    pub broker: BrokerSettings,
    /// Stability sampling.
    pub stability: StabilityPolicy,
    /// Bounded capacity of the filesystem event channel.
    pub event_capacity: usize,
    /// Publish files already present at startup.
    pub scan_existing: bool,
    /// Logging.
    pub log: LogSettings,
}

/// Settings for the worker process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Inbox and terminal directories.
    pub layout: DirectoryLayout,
    /// Broker target.
    pub broker: BrokerSettings,
    /// Metadata store URL; `None` disables the store.
    pub database_url: Option<String>,
    /// Logging.
    pub log: LogSettings,
}

impl TryFrom<WatcherArgs> for WatcherSettings {
    type Error = ConfigError;

    fn try_from(args: WatcherArgs) -> ConfigResult<Self> {
        let (layout, broker, log) = common(args.common)?;
        if args.stability_checks < 2 {
            return Err(ConfigError::invalid(
                "stability_checks",
                args.stability_checks,
                "must_be_at_least_two",
            ));
        }
        if args.stability_delay_ms == 0 {
            return Err(ConfigError::invalid(
                "stability_delay_ms",
                args.stability_delay_ms,
                "must_be_positive",
            ));
        }
        let delay = Duration::from_millis(args.stability_delay_ms);
        let settle_timeout = Duration::from_secs(args.settle_timeout_secs);
        // The last of `checks` samples lands (checks - 1) delays after the first.
        let sampling = delay.saturating_mul(args.stability_checks - 1);
        if settle_timeout < sampling {
            return Err(ConfigError::invalid(
                "settle_timeout_secs",
                args.settle_timeout_secs,
                "shorter_than_stability_window",
            ));
        }
        if args.event_capacity == 0 {
            return Err(ConfigError::invalid(
                "event_capacity",
                args.event_capacity,
                "must_be_positive",
            ));
        }
        Ok(Self {
            layout,
            broker,
            stability: StabilityPolicy {
                delay,
                checks: args.stability_checks,
                settle_timeout,
            },
            event_capacity: args.event_capacity,
            scan_existing: args.scan_existing,
            log,
        })
    }
}

impl TryFrom<WorkerArgs> for WorkerSettings {
    type Error = ConfigError;

    fn try_from(args: WorkerArgs) -> ConfigResult<Self> {
        let (layout, broker, log) = common(args.common)?;
        let database_url = args
            .database_url
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty());
        Ok(Self {
            layout,
            broker,
            database_url,
            log,
        })
    }
}

fn common(args: CommonArgs) -> ConfigResult<(DirectoryLayout, BrokerSettings, LogSettings)> {
    let queue = args.queue.trim().to_string();
    if queue.is_empty() {
        return Err(ConfigError::invalid("queue", args.queue, "empty"));
    }
    if args.amqp_url.trim().is_empty() {
        return Err(ConfigError::InvalidField {
            field: "amqp_url",
            value: None,
            reason: "empty",
        });
    }
    if args.reconnect_attempts == 0 {
        return Err(ConfigError::invalid(
            "reconnect_attempts",
            args.reconnect_attempts,
            "must_be_positive",
        ));
    }
    if args.inbox == args.processed_dir || args.inbox == args.failed_dir {
        return Err(ConfigError::invalid(
            "inbox",
            args.inbox.display(),
            "overlaps_terminal_directory",
        ));
    }
    let format = args
        .log_format
        .parse::<LogFormat>()
        .map_err(|_| ConfigError::invalid("log_format", &args.log_format, "unknown_format"))?;

    Ok((
        DirectoryLayout::new(args.inbox, args.processed_dir, args.failed_dir),
        BrokerSettings {
            amqp_url: args.amqp_url,
            queue,
            backoff: BackoffPolicy {
                initial: Duration::from_millis(args.reconnect_delay_ms),
                max_attempts: args.reconnect_attempts,
            },
        },
        LogSettings {
            level: args.log_level,
            format,
        },
    ))
}
