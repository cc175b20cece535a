//! civic-api: REST API server for the civic issue tracker

use anyhow::Context;
use civic_api::{AppState, cors_layer, router};
use civic_core::{Config, LifecycleService};
use std::sync::Arc;

fn init_tracing() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutting down");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Config::load_default().context("Failed to load config")?;
    let service = LifecycleService::from_config(&config).context("Failed to open store")?;

    let state = Arc::new(AppState::new(service, !config.is_production()));
    let app = router(state, cors_layer(&config.server.cors_origins));

    let addr = (config.server.host.as_str(), config.server.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}:{}", addr.0, addr.1))?;
    tracing::info!(
        environment = %config.environment,
        "Starting civic-api on {}",
        listener.local_addr()?
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}
