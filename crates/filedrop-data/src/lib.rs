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

//! Data access layer for filedrop: migrations and the imported-files store.

pub mod error;
pub mod store;

pub use error::{DataError, Result as DataResult};
pub use store::{ImportedFileRow, MetadataStore, NoopMetadataStore, PgMetadataStore};
