//! Prometheus metrics for the relay

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

use crate::error::{RelayError, Result};

/// Relay counters, registered on a dedicated registry
#[derive(Clone)]
pub struct RelayMetrics {
    registry: Registry,
    pub upstream_connects: IntCounter,
    pub upstream_disconnects: IntCounter,
    pub upstream_messages: IntCounter,
    pub upstream_messages_dropped: IntCounter,
    pub subscribers: IntGauge,
    pub broadcast_failures: IntCounter,
    pub snapshot_fetches: IntCounterVec,
}

impl RelayMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let upstream_connects = IntCounter::new(
            "relay_upstream_connects_total",
            "Successful upstream WebSocket connections",
        )?;
        let upstream_disconnects = IntCounter::new(
            "relay_upstream_disconnects_total",
            "Upstream disconnects, each followed by one reconnect attempt",
        )?;
        let upstream_messages = IntCounter::new(
            "relay_upstream_messages_total",
            "Upstream messages applied to the cache",
        )?;
        let upstream_messages_dropped = IntCounter::new(
            "relay_upstream_messages_dropped_total",
            "Malformed upstream messages dropped",
        )?;
        let subscribers = IntGauge::new("relay_subscribers", "Connected downstream subscribers")?;
        let broadcast_failures = IntCounter::new(
            "relay_broadcast_failures_total",
            "Per-subscriber deliveries that failed",
        )?;
        let snapshot_fetches = IntCounterVec::new(
            Opts::new("relay_snapshot_fetches_total", "Kline snapshot fetches by outcome"),
            &["outcome"],
        )?;

        registry.register(Box::new(upstream_connects.clone()))?;
        registry.register(Box::new(upstream_disconnects.clone()))?;
        registry.register(Box::new(upstream_messages.clone()))?;
        registry.register(Box::new(upstream_messages_dropped.clone()))?;
        registry.register(Box::new(subscribers.clone()))?;
        registry.register(Box::new(broadcast_failures.clone()))?;
        registry.register(Box::new(snapshot_fetches.clone()))?;

        Ok(Self {
            registry,
            upstream_connects,
            upstream_disconnects,
            upstream_messages,
            upstream_messages_dropped,
            subscribers,
            broadcast_failures,
            snapshot_fetches,
        })
    }

    /// Render all metrics in the Prometheus text format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| RelayError::MetricsError(e.to_string()))
    }
}
