//! Cooperative cancellation on Ctrl+C / SIGTERM

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Cancel `token` on the first termination request
///
/// Stages check the token between units of work; nothing in flight is aborted.
pub fn install(token: CancellationToken) {
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("Shutdown requested, finishing in-flight work");
        token.cancel();
    });
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
