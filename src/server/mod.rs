//! HTTP server exposing the chat pipeline
//!
//! `POST /chat` returns a server-sent event stream of
//! [`StreamEvent`](crate::pipeline::StreamEvent) frames; `GET /health` is a
//! liveness probe. The event channel closing ends the SSE stream.

use crate::error::{CallsightError, Result};
use crate::pipeline::ChatPipeline;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::unfold;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;

struct AppState {
    pipeline: Arc<ChatPipeline>,
}

/// One inbound chat request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub query: String,
}

/// Run the HTTP server until ctrl-c.
pub async fn serve(pipeline: Arc<ChatPipeline>, host: &str, port: u16) -> Result<()> {
    let state = Arc::new(AppState { pipeline });

    let app = Router::new()
        .route("/chat", post(handle_chat))
        .route("/health", get(handle_health))
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| CallsightError::Server(format!("invalid bind address: {e}")))?;

    let listener = TcpListener::bind(addr).await.map_err(|e| CallsightError::Io {
        source: e,
        context: format!("Failed to bind {addr}"),
    })?;

    tracing::info!("Listening on http://{addr}");
    tracing::info!("  POST /chat   - chat event stream");
    tracing::info!("  GET  /health - liveness probe");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CallsightError::Server(e.to_string()))?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::error!("Failed to install ctrl-c handler: {e}");
        return;
    }
    tracing::info!("Ctrl-c received, shutting down");
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "callsight" }))
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> impl IntoResponse {
    tracing::info!(session_id = %request.session_id, "chat request");

    let events = state
        .pipeline
        .stream_chat(request.session_id, request.query);

    let stream = unfold(events, |mut events| async move {
        let event = events.recv().await?;
        let data = serde_json::to_string(&event).unwrap_or_default();
        Some((Ok::<_, Infallible>(Event::default().data(data)), events))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
