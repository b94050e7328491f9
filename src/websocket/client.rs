//! WebSocket client for the Bybit public stream
//!
//! Handles connection and message reception over tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

use super::{Connector, UpstreamConnection};
use crate::error::{RelayError, Result};

/// How long to wait for the peer's close frame
const CLOSE_GRACE: Duration = Duration::from_secs(5);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket client for a single connection
pub struct WebSocketClient {
    stream: Option<WsStream>,
    endpoint: String,
}

impl WebSocketClient {
    /// Connect to the WebSocket endpoint
    pub async fn connect(endpoint: &str) -> Result<Self> {
        info!(url = %endpoint, "Connecting to upstream WebSocket");

        let (ws_stream, response) = connect_async(endpoint).await.map_err(|e| {
            RelayError::WebSocketConnection(format!("Failed to connect to {}: {}", endpoint, e))
        })?;

        info!(url = %endpoint, status = ?response.status(), "Upstream WebSocket connected");

        Ok(Self {
            stream: Some(ws_stream),
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl UpstreamConnection for WebSocketClient {
    async fn send_text(&mut self, text: String) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| RelayError::WebSocketConnection("Not connected".to_string()))?;

        stream
            .send(Message::Text(text))
            .await
            .map_err(|e| RelayError::WebSocketMessage(e.to_string()))
    }

    async fn recv(&mut self) -> Result<Option<String>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or(RelayError::UpstreamClosed)?;

        match stream.next().await {
            Some(Ok(Message::Text(text))) => {
                debug!(len = text.len(), "Received text message");
                Ok(Some(text))
            }
            Some(Ok(Message::Binary(data))) => {
                let text = String::from_utf8_lossy(&data).to_string();
                Ok(Some(text))
            }
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                // tungstenite queues the pong reply itself
                debug!("Received ping/pong frame");
                Ok(None)
            }
            Some(Ok(Message::Close(frame))) => {
                warn!(frame = ?frame, endpoint = %self.endpoint, "Received close frame");
                self.stream = None;
                Err(RelayError::UpstreamClosed)
            }
            Some(Ok(Message::Frame(_))) => Ok(None),
            Some(Err(e)) => {
                error!(error = %e, endpoint = %self.endpoint, "WebSocket error");
                self.stream = None;
                Err(RelayError::WebSocketMessage(e.to_string()))
            }
            None => {
                warn!(endpoint = %self.endpoint, "WebSocket stream ended");
                self.stream = None;
                Err(RelayError::UpstreamClosed)
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.close(None).await;
            // Drain until the peer acknowledges; dropping the socket ends it otherwise
            let drain = async { while let Some(Ok(_)) = stream.next().await {} };
            if timeout(CLOSE_GRACE, drain).await.is_err() {
                debug!(endpoint = %self.endpoint, "Close handshake not acknowledged, dropping socket");
            }
        }
    }
}

/// Production connector for a fixed endpoint
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    endpoint: String,
}

impl TungsteniteConnector {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
        }
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    type Connection = WebSocketClient;

    async fn connect(&self) -> Result<WebSocketClient> {
        WebSocketClient::connect(&self.endpoint).await
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }
}
