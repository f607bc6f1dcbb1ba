use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use vestwatch::config::ConfigArgs;
use vestwatch::provider::IndexerClient;
use vestwatch::server::{self, AppState};
use vestwatch::store::SqliteStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = ConfigArgs::parse();
    vestwatch::telemetry::init_tracing(&args.log_level, args.log_json)?;
    let config = args.into_config();

    if config.indexer_url.is_empty() {
        anyhow::bail!("an indexer URL is required (--indexer-url or VESTWATCH_INDEXER_URL)");
    }

    let store = SqliteStore::connect(&config.database_url)
        .await
        .with_context(|| format!("failed to open database {}", config.database_url))?;
    let source = IndexerClient::new(&config.indexer_url, config.http_timeout)
        .context("failed to build indexer client")?;

    let state = AppState::new(Arc::new(store), Arc::new(source), &config);
    let listener = tokio::net::TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;

    tracing::info!(
        listen = %config.listen,
        indexer = %config.indexer_url,
        expected_mint = %config.expected_mint,
        refresh_gated = config.refresh_key.is_some(),
        "vestwatch: serving"
    );

    server::serve(listener, state, shutdown_signal()).await?;
    tracing::info!("vestwatch: stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("vestwatch: shutting down");
}
