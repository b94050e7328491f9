//! Error types for the market relay

use thiserror::Error;

/// Market relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("WebSocket connection error: {0}")]
    WebSocketConnection(String),

    #[error("WebSocket message error: {0}")]
    WebSocketMessage(String),

    #[error("Upstream connection closed")]
    UpstreamClosed,

    #[error("Failed to parse message: {0}")]
    ParseError(String),

    #[error("REST API error: {0}")]
    RestApiError(String),

    #[error("Rate limited by upstream (429)")]
    RateLimited,

    #[error("Resource not found (404): {0}")]
    NotFound(String),

    #[error("Unexpected upstream HTTP status: {0}")]
    UpstreamStatus(u16),

    #[error("Upstream rejected request: code {code}, {message}")]
    UpstreamRejected { code: i64, message: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Metrics error: {0}")]
    MetricsError(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for RelayError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RelayError::WebSocketConnection(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::ParseError(err.to_string())
    }
}

impl From<reqwest::Error> for RelayError {
    fn from(err: reqwest::Error) -> Self {
        RelayError::RestApiError(err.to_string())
    }
}

impl From<prometheus::Error> for RelayError {
    fn from(err: prometheus::Error) -> Self {
        RelayError::MetricsError(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::Io(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RelayError>;
