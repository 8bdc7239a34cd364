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

//! Filesystem operations for the ingestion pipeline.
//!
//! # Design
//! - Stability detection, fingerprinting, and relocation each live in their own module.
//! - Blocking file IO is pushed onto the blocking pool by the async entry points.
//! - Errors stay local to this crate and convert into the shared taxonomy at the boundary.

pub mod error;
pub mod fingerprint;
pub mod layout;
pub mod relocate;
pub mod stability;

pub use error::{FsOpsError, FsOpsResult};
pub use fingerprint::{CHUNK_SIZE, Fingerprinter, fingerprint_blocking, sha256_file};
pub use layout::{DirectoryLayout, is_candidate_name};
pub use relocate::{move_into, move_into_async};
pub use stability::{
    DEFAULT_SETTLE_TIMEOUT, DEFAULT_STABILITY_CHECKS, DEFAULT_STABILITY_DELAY, Settled,
    StabilityDetector, StabilityPolicy,
};
