//! WebSocket endpoint for the live runtime channel.
//!
//! Clients connect to `/ws` and receive JSON messages whenever a canvas,
//! the state history or an edit state changes. Text frames sent by the
//! client are parsed as runtime events and applied like `POST /api/events`.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use looplit_core::models::RuntimeEvent;

use crate::api::events::apply_runtime_event;
use crate::api::status::AppError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rx = state.ws_broadcast.subscribe();
    ws.on_upgrade(move |socket| handle_socket(socket, state, rx))
}

async fn handle_socket(
    mut socket: WebSocket,
    state: Arc<AppState>,
    mut rx: broadcast::Receiver<String>,
) {
    debug!("WebSocket client connected");

    let welcome = serde_json::json!({
        "type": "connected",
        "message": "looplit live updates",
    });
    if let Err(e) = socket.send(Message::Text(welcome.to_string())).await {
        warn!("failed to send welcome message: {}", e);
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if let Err(e) = socket.send(Message::Text(msg)).await {
                            debug!("WebSocket send error (client disconnected?): {}", e);
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("WebSocket client lagged by {} messages", n);
                        let lag_msg = serde_json::json!({
                            "type": "warning",
                            "message": format!("lagged by {} messages", n),
                        });
                        let _ = socket.send(Message::Text(lag_msg.to_string())).await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        debug!("broadcast channel closed, disconnecting WebSocket");
                        break;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_inbound(&state, &text).await {
                            if socket.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        break;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = socket.send(Message::Pong(data)).await {
                            debug!("WebSocket pong error: {}", e);
                            break;
                        }
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!("WebSocket receive error: {}", e);
                        break;
                    }
                }
            }
        }
    }

    debug!("WebSocket connection closed");
}

/// Apply one inbound frame. Returns an error frame for the sender when the
/// frame is not a valid event or cannot be applied.
async fn handle_inbound(state: &AppState, text: &str) -> Option<String> {
    let event: RuntimeEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "ignoring malformed runtime event");
            return Some(error_frame(&format!("invalid event: {}", e)));
        }
    };

    match apply_runtime_event(state, event).await {
        Ok(()) => None,
        Err(err) => Some(error_frame(&describe(err))),
    }
}

fn describe(err: AppError) -> String {
    match err {
        AppError::BadRequest(msg)
        | AppError::NotFound(msg)
        | AppError::Conflict(msg)
        | AppError::Internal(msg) => msg,
    }
}

fn error_frame(message: &str) -> String {
    serde_json::json!({ "type": "error", "message": message }).to_string()
}
