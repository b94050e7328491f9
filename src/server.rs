//! Downstream HTTP and WebSocket surface
//!
//! `/ws` upgrades subscribers onto the hub; `/health` and `/metrics` share
//! the same listener.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::error::{RelayError, Result};
use crate::hub::Subscription;
use crate::AppState;

/// Build the router with the single-origin CORS policy
pub fn router(state: Arc<AppState>) -> Result<Router> {
    let origin = HeaderValue::from_str(&state.config.allowed_origin).map_err(|e| {
        RelayError::ConfigError(format!(
            "invalid ALLOWED_ORIGIN {:?}: {}",
            state.config.allowed_origin, e
        ))
    })?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
        .allow_credentials(true);

    Ok(Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Serve until the listener fails
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let app = router(state)?;
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "Server is running");
    }
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Response {
    // Browsers always send Origin on upgrades; other clients may omit it
    if let Some(origin) = headers.get(header::ORIGIN) {
        if origin.as_bytes() != state.config.allowed_origin.as_bytes() {
            warn!(origin = ?origin, "Rejected subscriber from disallowed origin");
            return (StatusCode::FORBIDDEN, "Origin not allowed").into_response();
        }
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Pump hub events to one subscriber until either side goes away
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let Subscription { id, mut events } = state.hub.join().await;
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => {
                // None: the hub pruned this subscriber
                let Some(event) = event else { break };
                let text = match event.to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(subscriber = %id, error = %e, "Failed to serialize event");
                        continue;
                    }
                };
                if let Err(e) = sender.send(Message::Text(text)).await {
                    debug!(subscriber = %id, error = %e, "Send failed, disconnecting");
                    break;
                }
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                // Inbound frames are not consumed
                Some(Ok(_)) => {}
            }
        }
    }

    state.hub.leave(id).await;
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let upstream = *state.upstream_state.borrow();
    let subscribers = state.hub.subscriber_count().await;

    Json(serde_json::json!({
        "status": "healthy",
        "component": "market-relay",
        "upstream": upstream.as_str(),
        "subscribers": subscribers,
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn metrics(State(state): State<Arc<AppState>>) -> std::result::Result<String, StatusCode> {
    state.metrics.render().map_err(|e| {
        warn!(error = %e, "Failed to render metrics");
        StatusCode::INTERNAL_SERVER_ERROR
    })
}
