//! Runtime event intake.
//!
//! The agent runtime reports recorded states, tool-call lineages and canvas
//! assistant progress as [`RuntimeEvent`]s, either posted here or sent over
//! the WebSocket.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use tracing::{debug, info};

use looplit_core::models::RuntimeEvent;

use crate::api::canvas::update_canvas;
use crate::api::status::AppError;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/events", post(post_event))
}

async fn post_event(
    State(state): State<Arc<AppState>>,
    Json(event): Json<RuntimeEvent>,
) -> Result<Json<serde_json::Value>, AppError> {
    apply_runtime_event(&state, event).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// Apply one runtime event to the shared state and notify live clients.
pub async fn apply_runtime_event(state: &AppState, event: RuntimeEvent) -> Result<(), AppError> {
    match event {
        RuntimeEvent::StateEdit {
            chat_id,
            old_str,
            new_str,
        } => {
            let (applied, view) = update_canvas(state, chat_id.as_deref(), |canvas| {
                Ok(canvas.apply_state_edit(&old_str, &new_str))
            })
            .await?;
            debug!(chat_id = %view.chat_id, applied, "state_edit event handled");
        }
        RuntimeEvent::OutputState {
            func_name,
            lineage_id,
            state: output,
        } => {
            state
                .history
                .write()
                .await
                .append_output_state(&lineage_id, output);
            state.broadcast(serde_json::json!({
                "type": "history_updated",
                "func_name": func_name,
                "lineage_id": lineage_id,
            }));
        }
        RuntimeEvent::MapTcToLid { tc, lid } => {
            state.history.write().await.map_tool_call(&tc, &lid);
            state.broadcast(serde_json::json!({
                "type": "history_updated",
                "tool_call_id": tc,
                "lineage_id": lid,
            }));
        }
        RuntimeEvent::CanvasAgentStart { chat_id } => {
            let ((), view) = update_canvas(state, chat_id.as_deref(), |canvas| {
                canvas.agent_started();
                Ok(())
            })
            .await?;
            info!(chat_id = %view.chat_id, "canvas assistant running");
        }
        RuntimeEvent::CanvasAgentEnd {
            chat_id,
            response,
            error,
        } => {
            let ((), view) = update_canvas(state, chat_id.as_deref(), |canvas| {
                canvas.agent_finished(response, error);
                Ok(())
            })
            .await?;
            info!(chat_id = %view.chat_id, failed = view.error.is_some(), "canvas assistant finished");
        }
    }
    Ok(())
}
