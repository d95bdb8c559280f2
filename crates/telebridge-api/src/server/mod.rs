//! HTTP server for the device bridge.

pub mod router;
pub mod types;

pub use router::create_router;
pub use types::ServerState;

use std::net::SocketAddr;

use anyhow::Context;
use telebridge_bridge::DeviceBridge;

/// Serve the API on `bind` until Ctrl-C / SIGTERM.
pub async fn run(bind: SocketAddr, prefix: &str, bridge: DeviceBridge) -> anyhow::Result<()> {
    let health = bridge.health();
    if !health.store_available {
        tracing::warn!(
            backend = health.store_backend,
            "Device state store unavailable; device endpoints will answer 503"
        );
    }

    let app = create_router(ServerState::new(bridge), prefix);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;

    tracing::info!(
        address = %bind,
        prefix,
        broker = %health.broker,
        "Telebridge API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl-C: {}", e);
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
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
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
    tracing::info!("Shutdown signal received");
}
