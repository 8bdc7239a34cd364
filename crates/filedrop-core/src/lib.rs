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

//! Shared building blocks for the filedrop ingestion pipeline.
//!
//! Layout: `model.rs` (file descriptor and wire codec), `error.rs` (pipeline
//! error taxonomy), `outcome.rs` (per-message settlement decision),
//! `shutdown.rs` (signal-driven cancellation).

pub mod error;
pub mod model;
pub mod outcome;
pub mod shutdown;

pub use error::{IngestError, IngestResult};
pub use model::{CONTENT_TYPE, FileDescriptor};
pub use outcome::ProcessingOutcome;
pub use shutdown::{shutdown_token, wait_for_signal};

/// Queue used by the watcher and worker when none is configured.
pub const DEFAULT_QUEUE: &str = "import_queue";

/// Unacknowledged deliveries a worker connection may hold at once.
pub const PREFETCH_LIMIT: u16 = 1;
