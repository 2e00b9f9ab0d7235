//! Connector server binary
//!
//! Standalone launcher hosting one supervisor behind the connector HTTP
//! surface. Configuration comes from an optional TOML file plus the
//! `HOST`/`PORT`/`CONNECTOR_UID` environment variables.

use chain_connector::api::create_router;
use chain_connector::{http_callbacks, ConnectorConfig};
use chain_core::NodeSupervisor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing/logging
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt().with_env_filter(rust_log).init();

    let config = ConnectorConfig::load();
    tracing::info!(uid = %config.uid, addr = %config.addr(), "starting connector");

    let supervisor = NodeSupervisor::init(config.uid.clone(), http_callbacks())
        .map_err(|e| anyhow::anyhow!("supervisor init failed: {}", e))?;

    let app = create_router(supervisor);
    let listener = tokio::net::TcpListener::bind(config.addr()).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("connector shut down gracefully");
    Ok(())
}

/// Signal for graceful shutdown (Ctrl-C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install CTRL-C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received CTRL-C signal, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM signal, shutting down");
        }
    }
}
