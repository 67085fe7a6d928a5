//! State history API: download, upload and fork.
//!
//! The download and upload bodies are the JSON snapshot format, so a saved
//! file can be loaded back as-is.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use looplit_core::models::LooplitState;
use looplit_core::snapshot::HistorySummary;
use looplit_core::StateHistory;

use crate::api::status::AppError;
use crate::AppState;

#[derive(Deserialize)]
pub struct ForkRequest {
    pub function_id: String,
    pub lineage_id: String,
    /// Position in the forked state's messages; at most its message count.
    pub message_index: usize,
    /// State the new lineage starts from. Defaults to the latest state of
    /// `lineage_id`.
    #[serde(default)]
    pub state: Option<LooplitState>,
}

#[derive(Serialize)]
struct ForkResponse {
    lineage_id: String,
    forks: Vec<String>,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/history", get(get_history).put(put_history))
        .route("/api/history/summary", get(get_summary))
        .route("/api/history/fork", post(fork_lineage))
}

async fn get_history(State(state): State<Arc<AppState>>) -> Json<StateHistory> {
    Json(state.history.read().await.clone())
}

async fn get_summary(State(state): State<Arc<AppState>>) -> Json<HistorySummary> {
    Json(state.history.read().await.summary())
}

async fn put_history(
    State(state): State<Arc<AppState>>,
    Json(uploaded): Json<StateHistory>,
) -> Json<HistorySummary> {
    let summary = uploaded.summary();
    *state.history.write().await = uploaded;
    state.edit_states.write().await.clear();

    tracing::info!(lineages = summary.lineages, "state history replaced by upload");
    state.broadcast(serde_json::json!({ "type": "history_loaded", "summary": summary }));
    Json(summary)
}

async fn fork_lineage(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ForkRequest>,
) -> Result<Json<ForkResponse>, AppError> {
    let mut history = state.history.write().await;
    let from = match body.state {
        Some(from) => from,
        None => history.latest_state(&body.lineage_id)?.clone(),
    };

    let lineage_id = history.fork(
        &body.function_id,
        &body.lineage_id,
        &from,
        body.message_index,
    )?;
    let forks = history
        .forks_at(&body.function_id, body.message_index)
        .map(<[String]>::to_vec)
        .unwrap_or_default();
    drop(history);

    state.broadcast(serde_json::json!({
        "type": "lineage_forked",
        "function_id": body.function_id,
        "message_index": body.message_index,
        "lineage_id": lineage_id,
    }));

    Ok(Json(ForkResponse { lineage_id, forks }))
}
