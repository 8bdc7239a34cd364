//! Signal-driven cancellation shared by the watcher and worker binaries.

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Create a token that is cancelled on the first interrupt or termination signal.
#[must_use]
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received; finishing in-flight work");
        trigger.cancel();
    });
    token
}

/// Resolve once SIGINT (or SIGTERM on unix) is delivered to the process.
pub async fn wait_for_signal() {
    let interrupt = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for interrupt signal");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = interrupt => {}
        () = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_token_starts_uncancelled() {
        let token = shutdown_token();
        assert!(!token.is_cancelled());
        let child = token.child_token();
        token.cancel();
        assert!(child.is_cancelled());
    }
}
