//! Subscriber broadcast hub
//!
//! Every subscriber owns a bounded queue. Fan-out uses `try_send`, so a slow
//! or closed subscriber costs the broadcaster nothing beyond one failed push.
//! Closed subscribers are pruned; full ones just miss that update.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::SharedCache;
use crate::candles::Candle;
use crate::error::{RelayError, Result};
use crate::metrics::RelayMetrics;
use crate::orderbook::OrderBookSnapshot;
use crate::parser::Ticker;

/// Opaque per-connection id; a reconnecting client gets a new one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Server-to-client event
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    CandlestickData(Arc<Vec<Candle>>),
    OrderBookData(Arc<OrderBookSnapshot>),
    TickerData(Arc<Ticker>),
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::CandlestickData(_) => "candlestickData",
            ServerEvent::OrderBookData(_) => "orderBookData",
            ServerEvent::TickerData(_) => "tickerData",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| RelayError::SerializationError(e.to_string()))
    }
}

/// Receiving half handed to the connection task on join
#[derive(Debug)]
pub struct Subscription {
    pub id: SubscriberId,
    pub events: mpsc::Receiver<ServerEvent>,
}

/// Registry of downstream subscribers
pub struct BroadcastHub {
    cache: Arc<SharedCache>,
    metrics: Arc<RelayMetrics>,
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<ServerEvent>>>,
    buffer: usize,
}

impl BroadcastHub {
    pub fn new(cache: Arc<SharedCache>, metrics: Arc<RelayMetrics>, buffer: usize) -> Self {
        Self {
            cache,
            metrics,
            subscribers: Mutex::new(HashMap::new()),
            buffer: buffer.max(4),
        }
    }

    /// Register a subscriber and queue the current cache contents for it.
    ///
    /// The registry lock is held across the cache read and the insert, so an
    /// update is either part of the initial state or broadcast afterwards.
    pub async fn join(&self) -> Subscription {
        let id = SubscriberId::new();
        let (tx, events) = mpsc::channel(self.buffer);

        let mut subscribers = self.subscribers.lock().await;
        let snapshot = self.cache.read().await;

        if !snapshot.candles.is_empty() {
            let _ = tx.try_send(ServerEvent::CandlestickData(snapshot.candles.clone()));
            debug!(subscriber = %id, candles = snapshot.candles.len(), "Queued initial candlestick data");
        } else {
            warn!(subscriber = %id, "Candlestick data not available yet, will send when fetched");
        }

        let _ = tx.try_send(ServerEvent::OrderBookData(snapshot.order_book.clone()));

        if let Some(ticker) = snapshot.ticker {
            let _ = tx.try_send(ServerEvent::TickerData(ticker));
        }

        subscribers.insert(id, tx);
        self.metrics.subscribers.set(subscribers.len() as i64);
        info!(subscriber = %id, total = subscribers.len(), "New subscriber connected");

        Subscription { id, events }
    }

    pub async fn leave(&self, id: SubscriberId) {
        let mut subscribers = self.subscribers.lock().await;
        if subscribers.remove(&id).is_some() {
            self.metrics.subscribers.set(subscribers.len() as i64);
            info!(subscriber = %id, total = subscribers.len(), "Subscriber disconnected");
        }
    }

    /// Deliver `event` to every registered subscriber, returning how many
    /// accepted it. Per-subscriber failures never reach the caller.
    pub async fn broadcast(&self, event: ServerEvent) -> usize {
        let mut subscribers = self.subscribers.lock().await;
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in subscribers.iter() {
            match tx.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    self.metrics.broadcast_failures.inc();
                    warn!(subscriber = %id, event = event.name(), "Subscriber queue full, dropping update");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    self.metrics.broadcast_failures.inc();
                    closed.push(*id);
                }
            }
        }

        for id in closed {
            subscribers.remove(&id);
            debug!(subscriber = %id, "Pruned closed subscriber");
        }
        self.metrics.subscribers.set(subscribers.len() as i64);

        debug!(event = event.name(), delivered, "Broadcast update");
        delivered
    }

    pub async fn subscriber_count(&self) -> usize {
        self.subscribers.lock().await.len()
    }
}
