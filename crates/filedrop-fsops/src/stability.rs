//! Decides when a newly observed file has finished being written.
//!
//! # Design
//! - Sample the size at a fixed delay; `checks` consecutive equal samples mean stable.
//! - A differing sample becomes the new baseline.
//! - Every sleep observes the cancellation token and the overall settle timeout.

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::{FsOpsError, FsOpsResult};

/// Default pause between two size samples.
pub const DEFAULT_STABILITY_DELAY: Duration = Duration::from_millis(200);
/// Default number of consecutive agreeing samples.
pub const DEFAULT_STABILITY_CHECKS: u32 = 3;
/// Default upper bound on the time spent waiting for one file.
pub const DEFAULT_SETTLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Sampling parameters for the stability check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    /// Pause between two samples.
    pub delay: Duration,
    /// Consecutive samples that must report the same size (at least 2).
    pub checks: u32,
    /// Give up on a file that has not settled within this window.
    pub settle_timeout: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_STABILITY_DELAY,
            checks: DEFAULT_STABILITY_CHECKS,
            settle_timeout: DEFAULT_SETTLE_TIMEOUT,
        }
    }
}

/// Result of a successful stability wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settled {
    /// Size reported by the agreeing samples.
    pub size_bytes: u64,
    /// Total samples taken, including those before the last baseline.
    pub samples: u32,
}

/// Polls a file's size until it stops changing.
#[derive(Debug, Clone, Copy, Default)]
pub struct StabilityDetector {
    policy: StabilityPolicy,
}

impl StabilityDetector {
    /// Build a detector for the given policy.
    #[must_use]
    pub const fn new(policy: StabilityPolicy) -> Self {
        Self { policy }
    }

    /// Policy the detector samples with.
    #[must_use]
    pub const fn policy(&self) -> &StabilityPolicy {
        &self.policy
    }

    /// Wait until the file at `path` reports the same size across the configured samples.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Io`] if the file vanishes or cannot be inspected,
    /// [`FsOpsError::Unsettled`] when the settle timeout elapses, and
    /// [`FsOpsError::Cancelled`] if `cancel` fires while sleeping.
    pub async fn wait_until_stable(
        &self,
        path: &Path,
        cancel: &CancellationToken,
    ) -> FsOpsResult<Settled> {
        self.settle(path, cancel, || async move {
            tokio::fs::metadata(path).await.map(|meta| meta.len())
        })
        .await
    }

    pub(crate) async fn settle<F, Fut>(
        &self,
        path: &Path,
        cancel: &CancellationToken,
        mut sample: F,
    ) -> FsOpsResult<Settled>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<u64>>,
    {
        let required = self.policy.checks.max(2);
        let deadline = Instant::now() + self.policy.settle_timeout;
        let mut baseline: Option<u64> = None;
        let mut agreeing = 0_u32;
        let mut samples = 0_u32;

        loop {
            let size = sample()
                .await
                .map_err(|source| FsOpsError::io("stability.sample", path, source))?;
            samples = samples.saturating_add(1);

            if baseline == Some(size) {
                agreeing += 1;
            } else {
                baseline = Some(size);
                agreeing = 1;
            }
            trace!(path = %path.display(), size, agreeing, "stability sample");

            if agreeing >= required {
                return Ok(Settled {
                    size_bytes: size,
                    samples,
                });
            }

            if Instant::now() + self.policy.delay > deadline {
                return Err(FsOpsError::Unsettled {
                    path: path.to_path_buf(),
                    samples,
                });
            }

            tokio::select! {
                () = cancel.cancelled() => return Err(FsOpsError::Cancelled),
                () = tokio::time::sleep(self.policy.delay) => {}
            }
        }
    }
}
