//! Configuration module for the market relay

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Smallest per-subscriber queue that still fits the join-time pushes
const MIN_SUBSCRIBER_BUFFER: usize = 4;

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// WebSocket endpoint for the upstream public stream
    pub ws_endpoint: String,

    /// REST endpoint for kline snapshots
    pub rest_endpoint: String,

    /// Trading symbol (e.g., "SOLUSDT")
    pub symbol: String,

    /// Kline interval passed to the snapshot endpoint
    pub interval: String,

    /// Stream topic subscribed to on every (re)connect
    pub topic: String,

    /// Fixed delay between an upstream disconnect and the next attempt
    pub reconnect_delay_ms: u64,

    /// Application-level ping period while connected (0 disables)
    pub heartbeat_interval_secs: u64,

    /// Listen address for subscribers, health and metrics
    pub listen_addr: String,

    /// The only browser origin accepted downstream
    pub allowed_origin: String,

    /// Queue capacity per subscriber
    pub subscriber_buffer: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();
        let symbol = env::var("SYMBOL")
            .map(|s| s.trim().to_uppercase())
            .unwrap_or(defaults.symbol);
        let topic = env::var("TOPIC").unwrap_or_else(|_| default_topic(&symbol));

        let config = Self {
            ws_endpoint: env::var("WS_ENDPOINT").unwrap_or(defaults.ws_endpoint),
            rest_endpoint: env::var("REST_ENDPOINT").unwrap_or(defaults.rest_endpoint),
            symbol,
            interval: env::var("KLINE_INTERVAL").unwrap_or(defaults.interval),
            topic,
            reconnect_delay_ms: parse_env("RECONNECT_DELAY_MS", defaults.reconnect_delay_ms),
            heartbeat_interval_secs: parse_env(
                "HEARTBEAT_INTERVAL_SECS",
                defaults.heartbeat_interval_secs,
            ),
            listen_addr: env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            allowed_origin: env::var("ALLOWED_ORIGIN").unwrap_or(defaults.allowed_origin),
            subscriber_buffer: parse_env("SUBSCRIBER_BUFFER", defaults.subscriber_buffer)
                .max(MIN_SUBSCRIBER_BUFFER),
        };

        if config.symbol.is_empty() {
            anyhow::bail!("SYMBOL must not be empty");
        }

        Ok(config)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Heartbeat period, `None` when disabled
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        (self.heartbeat_interval_secs > 0).then(|| Duration::from_secs(self.heartbeat_interval_secs))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ws_endpoint: "wss://stream.bybit.com/v5/public/spot".to_string(),
            rest_endpoint: "https://api.bybit.com/v5/market/kline".to_string(),
            symbol: "SOLUSDT".to_string(),
            interval: "15".to_string(),
            topic: default_topic("SOLUSDT"),
            reconnect_delay_ms: 5000,
            heartbeat_interval_secs: 20,
            listen_addr: "0.0.0.0:5000".to_string(),
            allowed_origin: "http://localhost:4200".to_string(),
            subscriber_buffer: 256,
        }
    }
}

fn default_topic(symbol: &str) -> String {
    format!("tickers.{}", symbol)
}

fn parse_env<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
