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
#![allow(clippy::multiple_crate_versions)]

//! Binary entrypoint for the inbox watcher.

use std::process::ExitCode;

use filedrop_watcher::run_watcher;

/// Watch the inbox and publish descriptors until a shutdown signal arrives.
#[tokio::main]
async fn main() -> ExitCode {
    match run_watcher().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("filedrop-watcher: {err}");
            ExitCode::FAILURE
        }
    }
}
