//! HTTP and WebSocket routes for the Pacer server.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex as TokioMutex;

use crate::protocol::{ClientMessage, Telemetry};
use crate::session::{CoordinatorHandle, SubmitOutcome};

/// Application state shared across handlers.
pub struct AppState {
    /// Client of the session coordinator actor.
    pub coordinator: CoordinatorHandle,
}

type Sender = Arc<TokioMutex<SplitSink<WebSocket, Message>>>;

/// Create the router with all routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .route("/api/telemetry", get(telemetry_handler))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Health check handler.
async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Current realized frequencies as JSON.
async fn telemetry_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.coordinator.telemetry().await {
        Ok(telemetry) => Json(telemetry).into_response(),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response(),
    }
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_websocket(socket, state))
}

/// Handle one control-channel connection.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let sender: Sender = Arc::new(TokioMutex::new(sender));
    tracing::info!("Client connected");

    let mut feed = state.coordinator.subscribe();

    // Telemetry right away, then periodically.
    match state.coordinator.telemetry().await {
        Ok(telemetry) => {
            send_telemetry(&sender, &telemetry).await;
        }
        Err(e) => tracing::warn!("No initial telemetry: {}", e),
    }

    let periodic = sender.clone();
    let forward_task = tokio::spawn(async move {
        loop {
            match feed.recv().await {
                Ok(telemetry) => {
                    if !send_telemetry(&periodic, &telemetry).await {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Telemetry feed lagged by {} samples", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    while let Some(result) = receiver.next().await {
        match result {
            Ok(Message::Text(text)) => handle_text(text.as_str(), &state, &sender).await,
            Ok(Message::Close(_)) => break,
            Err(e) => {
                tracing::warn!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }

    forward_task.abort();
    tracing::info!("Client disconnected");
}

/// Handle one inbound text frame.
async fn handle_text(text: &str, state: &Arc<AppState>, sender: &Sender) {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            tracing::warn!("Ignoring malformed cadence message: {} (input: {})", e, text);
            return;
        }
    };

    match message {
        ClientMessage::Cadence(update) => match state.coordinator.update_cadence(update).await {
            Ok(telemetry) => {
                send_telemetry(sender, &telemetry).await;
            }
            Err(e) => tracing::error!("Cadence update failed: {}", e),
        },
        ClientMessage::Submission(text) => match state.coordinator.submit(text).await {
            Ok(SubmitOutcome::Started(id)) => tracing::debug!("Submission running in context {}", id),
            Ok(SubmitOutcome::Directive(directive)) => tracing::debug!("Directive {:?} applied", directive),
            Ok(SubmitOutcome::StartFailed(message)) => tracing::debug!("Submission not started: {}", message),
            Err(e) => tracing::error!("Submission failed: {}", e),
        },
    }
}

/// Send telemetry; returns false once the socket is closed.
async fn send_telemetry(sender: &Sender, telemetry: &Telemetry) -> bool {
    let mut sender = sender.lock().await;
    sender.send(Message::Text(telemetry.encode().into())).await.is_ok()
}
