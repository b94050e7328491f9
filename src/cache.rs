//! Shared state cache
//!
//! Latest candle sequence, order book and ticker. Each field is held behind
//! an `Arc` and swapped whole under the write lock, so a reader either sees
//! the old value or the new one.

use std::sync::Arc;
use tokio::sync::RwLock;

use crate::candles::Candle;
use crate::orderbook::OrderBookSnapshot;
use crate::parser::Ticker;

/// Point-in-time view of the cache. Cloning only bumps reference counts.
#[derive(Debug, Clone, Default)]
pub struct CacheSnapshot {
    pub candles: Arc<Vec<Candle>>,
    pub order_book: Arc<OrderBookSnapshot>,
    pub ticker: Option<Arc<Ticker>>,
}

/// Process-wide cache, injected into the writers and the hub
#[derive(Debug, Default)]
pub struct SharedCache {
    inner: RwLock<CacheSnapshot>,
}

impl SharedCache {
    /// Empty cache: no candles, empty book, no ticker
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn read(&self) -> CacheSnapshot {
        self.inner.read().await.clone()
    }

    /// Replace the candle sequence, returning the stored value
    pub async fn replace_candles(&self, candles: Vec<Candle>) -> Arc<Vec<Candle>> {
        let candles = Arc::new(candles);
        self.inner.write().await.candles = candles.clone();
        candles
    }

    pub async fn replace_order_book(&self, book: OrderBookSnapshot) -> Arc<OrderBookSnapshot> {
        let book = Arc::new(book);
        self.inner.write().await.order_book = book.clone();
        book
    }

    pub async fn replace_ticker(&self, ticker: Ticker) -> Arc<Ticker> {
        let ticker = Arc::new(ticker);
        self.inner.write().await.ticker = Some(ticker.clone());
        ticker
    }
}
