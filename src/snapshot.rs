//! Kline snapshot fetcher
//!
//! One request per call. A successful response replaces the cached candle
//! sequence wholesale; every failure leaves the cache as it was.

use reqwest::StatusCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::cache::SharedCache;
use crate::candles::Candle;
use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::hub::{BroadcastHub, ServerEvent};
use crate::metrics::RelayMetrics;
use crate::parser::KlineResponse;

/// Result of one fetch, after logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Cache replaced with this many candles
    Updated(usize),
    /// Body had no `result.list`; cache untouched
    NoData,
    RateLimited,
    NotFound,
    Failed,
}

impl FetchOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            FetchOutcome::Updated(_) => "updated",
            FetchOutcome::NoData => "no_data",
            FetchOutcome::RateLimited => "rate_limited",
            FetchOutcome::NotFound => "not_found",
            FetchOutcome::Failed => "failed",
        }
    }
}

pub struct SnapshotFetcher {
    client: reqwest::Client,
    endpoint: String,
    symbol: String,
    interval: String,
    cache: Arc<SharedCache>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<RelayMetrics>,
}

impl SnapshotFetcher {
    pub fn new(
        config: &Config,
        cache: Arc<SharedCache>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: config.rest_endpoint.clone(),
            symbol: config.symbol.clone(),
            interval: config.interval.clone(),
            cache,
            hub,
            metrics,
        }
    }

    /// Fetch the kline snapshot and fold it into the cache
    pub async fn fetch_snapshot(&self) -> FetchOutcome {
        info!(
            endpoint = %self.endpoint,
            symbol = %self.symbol,
            interval = %self.interval,
            "Fetching candlestick snapshot"
        );

        let outcome = match self.request().await {
            Ok(Some(candles)) => {
                let count = candles.len();
                let stored = self.cache.replace_candles(candles).await;
                if count > 0 {
                    self.hub.broadcast(ServerEvent::CandlestickData(stored)).await;
                }
                info!(symbol = %self.symbol, candles = count, "Fetched candlestick data successfully");
                FetchOutcome::Updated(count)
            }
            Ok(None) => {
                warn!(symbol = %self.symbol, "No candlestick data found in API response");
                FetchOutcome::NoData
            }
            Err(RelayError::RateLimited) => {
                warn!(
                    symbol = %self.symbol,
                    "Rate limited, skipping this request to avoid further 429 errors"
                );
                FetchOutcome::RateLimited
            }
            Err(RelayError::NotFound(url)) => {
                error!(
                    url = %url,
                    symbol = %self.symbol,
                    "Error 404: resource not found, check the REST API URL or the symbol"
                );
                FetchOutcome::NotFound
            }
            Err(e) => {
                error!(error = %e, symbol = %self.symbol, "Error fetching candlestick data");
                FetchOutcome::Failed
            }
        };

        self.metrics
            .snapshot_fetches
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn request(&self) -> Result<Option<Vec<Candle>>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("symbol", self.symbol.as_str()),
                ("interval", self.interval.as_str()),
            ])
            .send()
            .await?;

        check_status(response.status(), response.url().as_str())?;

        let body = response.text().await?;
        KlineResponse::parse(&body)?.into_candles()
    }
}

fn check_status(status: StatusCode, url: &str) -> Result<()> {
    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(RelayError::RateLimited),
        StatusCode::NOT_FOUND => Err(RelayError::NotFound(url.to_string())),
        s if !s.is_success() => Err(RelayError::UpstreamStatus(s.as_u16())),
        _ => Ok(()),
    }
}
