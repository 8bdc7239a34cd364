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

//! Queue worker: validates each descriptor, records it, and moves the file out of the inbox.
//!
//! Layout: `process.rs` (per-message state machine), `consume.rs` (delivery loop),
//! `bootstrap.rs` (process wiring), `error.rs` (fatal errors).

pub mod bootstrap;
pub mod consume;
pub mod error;
pub mod process;

pub use bootstrap::{WorkerDependencies, run_worker, run_worker_with};
pub use consume::{ConsumeLoop, ConsumeSummary};
pub use error::{WorkerError, WorkerResult};
pub use process::MessageProcessor;
