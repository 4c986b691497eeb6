// crates/server/src/main.rs
//! Metafile server binary.
//!
//! Installs the process-wide task registry, serves the HTTP API on localhost
//! and shuts the registry down (cancelling outstanding jobs) on Ctrl-C.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use metafile_core::{registry, RegistryConfig, TorrentCreator};
use metafile_server::create_app;
use tracing_subscriber::EnvFilter;

/// Default port for the server.
const DEFAULT_PORT: u16 = 47893;

/// Get the server port from environment or use default.
fn get_port() -> u16 {
    std::env::var("METAFILE_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = RegistryConfig::from_env();
    let registry = registry::install(config, TorrentCreator::default())
        .context("failed to install task registry")?;

    let app = create_app(registry.clone());

    let port = get_port();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(
        %addr,
        max_tasks = config.max_tasks,
        workers = config.worker_threads(),
        "Metafile server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    registry.shutdown();
    Ok(())
}
