//! WebSocket server for real-time stress tracking.
//!
//! This module provides the HTTP surface of the service:
//! - `GET /health` — liveness probe with the crate version
//! - `GET /ws/track` — WebSocket upgrade; one tracking session per connection
//! - `GET /api/history` — recent session summaries, newest first
//! - `GET /api/wellness/recommendations` — pending recommendations, newest first
//!
//! # Architecture
//!
//! ```text
//! Client ──→ GET /ws/track ──→ transport loop ──→ SessionCoordinator
//!                                   ↑                     ↓
//!                             ServerMessage JSON ←── outbound channel
//! ```
//!
//! The transport loop only parses frames and shuttles messages; all session
//! logic lives in [`SessionCoordinator`]. Malformed frames produce an `error`
//! message and the session keeps running.

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};

use crate::appctx::AppContextProvider;
use crate::classifier::StressClassifier;
use crate::events::{ClientEvent, ServerMessage};
use crate::session::{CadenceConfig, SessionCoordinator};
use crate::storage::Storage;

/// How long the transport loop waits for an inbound frame before flushing
/// outbound messages again.
const RECV_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(100);

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
    /// Timing knobs handed to each session
    pub cadence: CadenceConfig,
}

/// Shared server state
pub struct AppState {
    classifier: Arc<StressClassifier>,
    storage: Storage,
    provider: Arc<dyn AppContextProvider>,
    cadence: CadenceConfig,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Optional row cap for the read endpoints
#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<u32>,
}

/// GET /api/history
async fn session_history(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state
        .storage
        .read_session_history(query.limit.unwrap_or(10))
        .await
    {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => {
            tracing::error!("failed to read session history: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /api/wellness/recommendations
async fn pending_recommendations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    match state
        .storage
        .read_recent_recommendations(query.limit.unwrap_or(3))
        .await
    {
        Ok(recommendations) => Json(recommendations).into_response(),
        Err(e) => {
            tracing::error!("failed to read pending recommendations: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// GET /ws/track
async fn ws_track(
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Per-connection transport loop.
///
/// Inbound text frames are parsed into [`ClientEvent`]s and forwarded to the
/// session task; outbound [`ServerMessage`]s are drained from the session's
/// channel and written as JSON frames. When the peer disconnects the event
/// channel is dropped, which lets the coordinator finalize and persist the
/// session summary.
async fn handle_socket(mut socket: WebSocket, state: Arc<AppState>) {
    let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(256);
    let (outbound_tx, mut outbound_rx) = mpsc::channel::<ServerMessage>(64);

    let coordinator = SessionCoordinator::new(
        state.classifier.clone(),
        state.storage.clone(),
        state.provider.clone(),
        state.cadence,
        outbound_tx,
    );
    let session_id = coordinator.id();
    let session_task = tokio::spawn(coordinator.run(event_rx));

    'transport: loop {
        while let Ok(message) = outbound_rx.try_recv() {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if socket.send(Message::Text(json)).await.is_err() {
                        break 'transport;
                    }
                }
                Err(e) => {
                    tracing::error!(session_id = %session_id, "failed to serialize message: {e}")
                }
            }
        }

        match tokio::time::timeout(RECV_POLL_INTERVAL, socket.recv()).await {
            // No frame yet; go flush outbound again
            Err(_) => continue,
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                tracing::debug!(session_id = %session_id, "websocket receive error: {e}");
                break;
            }
            Ok(Some(Ok(Message::Text(text)))) => match ClientEvent::parse(&text) {
                Ok(event) => {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    tracing::debug!(session_id = %session_id, "rejected event: {e}");
                    let error = ServerMessage::error(format!("invalid event: {e}"));
                    if let Ok(json) = serde_json::to_string(&error) {
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                }
            },
            Ok(Some(Ok(Message::Close(_)))) => break,
            // Binary frames are not part of the protocol; ping/pong is
            // handled by axum
            Ok(Some(Ok(_))) => {}
        }
    }

    // Closing the event channel ends the session loop
    drop(event_tx);
    let _ = session_task.await;

    // Best-effort delivery of anything the coordinator produced on the way out
    while let Ok(message) = outbound_rx.try_recv() {
        if let Ok(json) = serde_json::to_string(&message) {
            if socket.send(Message::Text(json)).await.is_err() {
                break;
            }
        }
    }

    tracing::debug!(session_id = %session_id, "connection closed");
}

/// Run the server
pub async fn run(
    config: ServerConfig,
    classifier: Arc<StressClassifier>,
    storage: Storage,
    provider: Arc<dyn AppContextProvider>,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(AppState {
        classifier,
        storage,
        provider,
        cadence: config.cadence,
    });

    let app = Router::new()
        .route("/health", get(health))
        .route("/ws/track", get(ws_track))
        .route("/api/history", get(session_history))
        .route("/api/wellness/recommendations", get(pending_recommendations))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("stresswatch server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("server shutdown signal received");
            })
            .await
        {
            tracing::error!("server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
