//! Bounded exponential backoff for broker reconnects.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{BrokerError, BrokerResult};

/// Upper bound on a single reconnect delay.
pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reconnect schedule: `initial * 2^attempt`, capped at [`MAX_BACKOFF`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Delay after the first failure.
    pub initial: Duration,
    /// Attempts before giving up (at least one).
    pub max_attempts: u32,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(500),
            max_attempts: 5,
        }
    }
}

impl BackoffPolicy {
    /// Delay to wait after the zero-based `attempt` failed.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.min(16));
        self.initial.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Run `op` until it succeeds, sleeping between failures.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::Exhausted`] carrying the last failure once
    /// `max_attempts` is reached, or [`BrokerError::Cancelled`] if `cancel`
    /// fires while sleeping.
    pub async fn retry<T, F, Fut>(
        &self,
        operation: &'static str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> BrokerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = BrokerResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0_u32;
        loop {
            if cancel.is_cancelled() {
                return Err(BrokerError::Cancelled);
            }
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if attempt >= attempts {
                        return Err(BrokerError::Exhausted {
                            operation,
                            attempts: attempt,
                            source: Box::new(err),
                        });
                    }
                    let delay = self.delay_for(attempt - 1);
                    warn!(
                        operation,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %err,
                        "broker operation failed; retrying"
                    );
                    tokio::select! {
                        () = cancel.cancelled() => return Err(BrokerError::Cancelled),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
