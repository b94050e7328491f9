//! Upstream connection manager
//!
//! Drives the single upstream connection through
//! Disconnected -> Connecting -> Connected -> Disconnected, forever, with a
//! fixed delay between a disconnect and the next attempt.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::{Connector, UpstreamConnection};
use crate::cache::SharedCache;
use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::hub::{BroadcastHub, ServerEvent};
use crate::metrics::RelayMetrics;
use crate::parser::{ControlRequest, ParsedMessage};

/// Lifecycle of the upstream connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        }
    }
}

/// Known failure signatures in upstream error text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamDiagnosis {
    BadGateway,
    SubscriptionNotFound,
}

/// Classify an upstream error message. Diagnostic only.
pub fn diagnose_upstream_error(message: &str) -> Option<UpstreamDiagnosis> {
    if message.contains("502") {
        Some(UpstreamDiagnosis::BadGateway)
    } else if message.contains("404") {
        Some(UpstreamDiagnosis::SubscriptionNotFound)
    } else {
        None
    }
}

/// Owns the one upstream connection and keeps it alive
pub struct StreamManager<C: Connector> {
    connector: C,
    topic: String,
    reconnect_delay: Duration,
    heartbeat: Option<Duration>,
    cache: Arc<SharedCache>,
    hub: Arc<BroadcastHub>,
    metrics: Arc<RelayMetrics>,
    state: watch::Sender<ConnectionState>,
}

impl<C: Connector> StreamManager<C> {
    pub fn new(
        connector: C,
        config: &Config,
        cache: Arc<SharedCache>,
        hub: Arc<BroadcastHub>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Self {
            connector,
            topic: config.topic.clone(),
            reconnect_delay: config.reconnect_delay(),
            heartbeat: config.heartbeat_interval(),
            cache,
            hub,
            metrics,
            state,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Run the manager. Never returns; every disconnect leads to exactly one
    /// new attempt after the reconnect delay.
    pub async fn run(&mut self) {
        info!(
            endpoint = %self.connector.endpoint(),
            topic = %self.topic,
            reconnect_delay_ms = self.reconnect_delay.as_millis() as u64,
            "Starting stream manager"
        );

        loop {
            match self.connect_and_process().await {
                Ok(()) | Err(RelayError::UpstreamClosed) => {
                    warn!(endpoint = %self.connector.endpoint(), "Upstream WebSocket closed");
                }
                Err(e) => self.report_error(&e),
            }

            self.set_state(ConnectionState::Disconnected);
            self.metrics.upstream_disconnects.inc();

            warn!(
                delay_secs = self.reconnect_delay.as_secs_f64(),
                "Attempting to reconnect"
            );
            sleep(self.reconnect_delay).await;
        }
    }

    /// One connection cycle. Returns once the connection is closed.
    async fn connect_and_process(&mut self) -> Result<()> {
        self.set_state(ConnectionState::Connecting);
        let mut conn = self.connector.connect().await?;

        self.set_state(ConnectionState::Connected);
        self.metrics.upstream_connects.inc();
        info!(endpoint = %self.connector.endpoint(), "Successfully connected to upstream");

        let result = self.process(&mut conn).await;
        conn.close().await;
        result
    }

    async fn process(&self, conn: &mut C::Connection) -> Result<()> {
        conn.send_text(ControlRequest::subscribe(&self.topic).to_json()?)
            .await?;
        info!(topic = %self.topic, "Sent subscription request");

        let mut heartbeat = self.heartbeat.map(|period| {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker
        });

        loop {
            tokio::select! {
                msg = conn.recv() => {
                    if let Some(text) = msg? {
                        self.process_message(&text).await;
                    }
                }
                _ = next_tick(&mut heartbeat) => {
                    conn.send_text(ControlRequest::ping().to_json()?).await?;
                    trace!("Sent heartbeat ping");
                }
            }
        }
    }

    /// Apply a single stream message. Never fails the connection.
    async fn process_message(&self, raw: &str) {
        match ParsedMessage::parse(raw, &self.topic) {
            Ok(ParsedMessage::Ticker(update)) => {
                debug!(
                    topic = %update.topic,
                    ts = ?update.ts,
                    kind = ?update.kind,
                    last_price = %update.ticker.last_price,
                    "Received ticker update"
                );
                self.metrics.upstream_messages.inc();

                let ticker = self.cache.replace_ticker(update.ticker).await;
                self.hub.broadcast(ServerEvent::TickerData(ticker)).await;
            }
            Ok(ParsedMessage::OtherTopic(topic)) => {
                trace!(topic = %topic, "Ignoring message for other topic");
            }
            Ok(ParsedMessage::Control(reply)) => match (reply.op.as_str(), reply.success) {
                ("subscribe", Some(false)) => {
                    error!(
                        topic = %self.topic,
                        ret_msg = ?reply.ret_msg,
                        "Subscription rejected by upstream"
                    );
                }
                ("subscribe", _) => info!(topic = %self.topic, "Subscription confirmed"),
                (op, success) => debug!(op = %op, success = ?success, "Control reply"),
            },
            Ok(ParsedMessage::Unknown(msg)) => {
                trace!(msg = %msg, "Unknown message type");
            }
            Err(e) => {
                self.metrics.upstream_messages_dropped.inc();
                warn!(error = %e, "Error processing upstream message");
            }
        }
    }

    fn report_error(&self, err: &RelayError) {
        let endpoint = self.connector.endpoint();
        let message = err.to_string();
        error!(endpoint = %endpoint, error = %message, "Upstream WebSocket error");

        match diagnose_upstream_error(&message) {
            Some(UpstreamDiagnosis::BadGateway) => error!(
                endpoint = %endpoint,
                "502 Bad Gateway: upstream may be temporarily down or the endpoint is incorrect"
            ),
            Some(UpstreamDiagnosis::SubscriptionNotFound) => error!(
                endpoint = %endpoint,
                topic = %self.topic,
                "404: subscription not found, verify the subscription parameters and topic name"
            ),
            None => {}
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = self.state.send_replace(next);
        debug!(from = prev.as_str(), to = next.as_str(), "Upstream state transition");
    }
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
