//! Market Relay Library
//!
//! Bridges one Bybit market data source (a public WebSocket stream plus the
//! kline REST endpoint) to any number of downstream WebSocket subscribers,
//! over a single shared upstream connection.

use std::sync::Arc;
use tokio::sync::watch;

pub mod cache;
pub mod candles;
pub mod config;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod orderbook;
pub mod parser;
pub mod server;
pub mod snapshot;
pub mod websocket;

pub use cache::{CacheSnapshot, SharedCache};
pub use candles::Candle;
pub use config::Config;
pub use error::{RelayError, Result};
pub use hub::{BroadcastHub, ServerEvent, SubscriberId, Subscription};
pub use metrics::RelayMetrics;
pub use orderbook::{Level, OrderBookSnapshot};
pub use parser::{KlineResponse, ParsedMessage, Ticker};
pub use snapshot::{FetchOutcome, SnapshotFetcher};
pub use websocket::{ConnectionState, StreamManager, TungsteniteConnector};

/// Application state shared with the downstream server
pub struct AppState {
    pub hub: Arc<BroadcastHub>,
    pub metrics: Arc<RelayMetrics>,
    pub config: Arc<Config>,
    pub upstream_state: watch::Receiver<ConnectionState>,
}
