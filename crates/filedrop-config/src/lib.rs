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

//! Configuration for the filedrop binaries.
//!
//! Layout: `args.rs` (clap structs with env fallbacks), `settings.rs`
//! (validated settings), `error.rs` (validation errors).

pub mod args;
pub mod error;
pub mod settings;

pub use args::{CommonArgs, DEFAULT_AMQP_URL, WatcherArgs, WorkerArgs};
pub use error::{ConfigError, ConfigResult};
pub use settings::{BrokerSettings, LogSettings, WatcherSettings, WorkerSettings};
