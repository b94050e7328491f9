//! WebSocket module for the upstream stream connection
//!
//! `Connector` and `UpstreamConnection` are the transport seams; the manager
//! only ever talks to them, which keeps the reconnect loop testable offline.

mod client;
mod manager;

use async_trait::async_trait;

pub use client::{TungsteniteConnector, WebSocketClient};
pub use manager::{diagnose_upstream_error, ConnectionState, StreamManager, UpstreamDiagnosis};

use crate::error::Result;

/// An open upstream connection
#[async_trait]
pub trait UpstreamConnection: Send {
    /// Send a text frame
    async fn send_text(&mut self, text: String) -> Result<()>;

    /// Next data frame. `Ok(None)` for control frames; `Err` once the
    /// connection is closed or broken.
    async fn recv(&mut self) -> Result<Option<String>>;

    /// Close and wait for the transport to confirm
    async fn close(&mut self);
}

/// Opens upstream connections
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: UpstreamConnection;

    async fn connect(&self) -> Result<Self::Connection>;

    /// Endpoint description for logs
    fn endpoint(&self) -> &str;
}
