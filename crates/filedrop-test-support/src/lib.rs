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

//! Shared test helpers used across integration suites.
//! Layout: fixtures.rs (temp inbox trees, docker availability check), postgres.rs (docker-backed database).

pub mod fixtures;
pub mod postgres;

pub use fixtures::{InboxFixture, docker_available, eventually};
pub use postgres::{PostgresContainer, start_postgres};
