//! Market Relay
//!
//! Keeps one upstream Bybit stream alive, seeds the cache from the kline
//! endpoint, and fans updates out to WebSocket subscribers.

use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use market_relay::{
    server, AppState, BroadcastHub, Config, RelayMetrics, SharedCache, SnapshotFetcher,
    StreamManager, TungsteniteConnector,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    info!("Starting Market Relay");

    // Load configuration
    let config = Arc::new(Config::load()?);
    info!(
        symbol = %config.symbol,
        topic = %config.topic,
        listen_addr = %config.listen_addr,
        "Configuration loaded"
    );

    let metrics = Arc::new(RelayMetrics::new()?);
    let cache = Arc::new(SharedCache::new());
    let hub = Arc::new(BroadcastHub::new(
        cache.clone(),
        metrics.clone(),
        config.subscriber_buffer,
    ));

    let mut manager = StreamManager::new(
        TungsteniteConnector::new(&config.ws_endpoint),
        &config,
        cache.clone(),
        hub.clone(),
        metrics.clone(),
    );

    let state = Arc::new(AppState {
        hub: hub.clone(),
        metrics: metrics.clone(),
        config: config.clone(),
        upstream_state: manager.subscribe_state(),
    });

    // One-shot startup snapshot; subscribers are served while it is in flight
    let fetcher = SnapshotFetcher::new(&config, cache, hub, metrics);
    tokio::spawn(async move {
        let outcome = fetcher.fetch_snapshot().await;
        info!(outcome = outcome.label(), "Initial snapshot fetch finished");
    });

    tokio::spawn(async move { manager.run().await });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    server::serve(listener, state).await?;

    Ok(())
}
