//! th-web server entry point

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::info;

use th_web::{AppState, build_router};
use trade_history::{Analyzer, Config, FileConfig, MetadataCache, Overrides, RpcTransactionSource, metadata_provider};

#[tokio::main]
async fn main() -> Result<()> {
    trade_history::init_tracing();

    let config_path = std::env::var("TH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let file_config = FileConfig::load_or_default(&config_path)?;
    let config = Config::from_file(&file_config, Overrides::from_env())?;

    let source = Arc::new(RpcTransactionSource::new(&config.rpc_url)?);
    let cache = Arc::new(MetadataCache::new(metadata_provider(config.helius_api_key.as_deref())?));
    let app = build_router(AppState::new(source, Arc::new(Analyzer::new(cache))));

    let listener = tokio::net::TcpListener::bind(&config.server_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.server_addr))?;

    info!("Listening on http://{}", config.server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    info!("Received Ctrl+C, shutting down");
}
