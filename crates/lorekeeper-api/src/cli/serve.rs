//! `lorekeeper serve`: run the HTTP server until Ctrl+C or SIGTERM.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::http::router::build_router;
use crate::state::AppState;

const PURGE_INTERVAL: Duration = Duration::from_secs(300);

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    let shutdown = CancellationToken::new();
    let sweeper = state.spawn_purge_sweeper(PURGE_INTERVAL, shutdown.clone());

    tracing::info!(%addr, "lorekeeper listening");
    println!("  Lorekeeper listening on http://{addr} (WebSocket at ws://{addr}/ws)");
    println!("  Press Ctrl+C to stop");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "purge sweeper ended abnormally");
    }

    println!("\n  Server stopped.");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM, then cancel `shutdown`.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
        _ = shutdown.cancelled() => {},
    }
    tracing::info!("shutdown signal received");
    shutdown.cancel();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_shutdown_signal_returns_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), shutdown_signal(token))
            .await
            .unwrap();
    }
}
