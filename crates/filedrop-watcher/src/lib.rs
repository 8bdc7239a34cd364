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

//! Inbox watcher: waits for files to settle, fingerprints them, and publishes
//! one descriptor per file.
//!
//! Layout: `source.rs` (notify subscription), `pipeline.rs` (ingest loop),
//! `bootstrap.rs` (process wiring), `error.rs` (fatal errors).

pub mod bootstrap;
pub mod error;
pub mod pipeline;
pub mod source;

pub use bootstrap::{WatcherDependencies, run_watcher, run_watcher_with};
pub use error::{WatcherError, WatcherResult};
pub use pipeline::{IngestPipeline, RunSummary};
pub use source::{EventSource, candidate_path};
