//! State canvas API endpoints.
//!
//! A canvas is opened on a lineage's state, receives the assistant's edit
//! suggestions as conflict regions, and is closed either by applying the
//! resolved buffer (`continue`) or by discarding it.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use looplit_core::conflict::{CursorPosition, Resolution};
use looplit_core::editor::BulkCommand;
use looplit_core::errors::SnapshotError;
use looplit_core::models::LooplitState;
use looplit_core::session::CanvasView;
use looplit_core::CanvasSession;

use crate::api::status::AppError;
use crate::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct OpenCanvasRequest {
    pub lineage_id: String,
    /// State to edit. Defaults to the lineage's current edit state, then to
    /// its latest recorded state.
    #[serde(default)]
    pub state: Option<LooplitState>,
    /// What the user wants changed, shown to the assistant.
    #[serde(default)]
    pub context: String,
}

#[derive(Deserialize)]
pub struct StateEditRequest {
    pub old_str: String,
    pub new_str: String,
}

#[derive(Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

/// Which side of a conflict to keep.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Current,
    Incoming,
}

impl From<Side> for Resolution {
    fn from(side: Side) -> Self {
        match side {
            Side::Current => Resolution::AcceptCurrent,
            Side::Incoming => Resolution::AcceptIncoming,
        }
    }
}

#[derive(Deserialize)]
pub struct ResolveRequest {
    pub index: usize,
    pub side: Side,
}

#[derive(Deserialize)]
pub struct BulkRequest {
    pub command: BulkCommand,
}

#[derive(Deserialize)]
pub struct BufferRequest {
    pub text: String,
}

#[derive(Serialize)]
struct StateEditResponse {
    applied: bool,
    canvas: CanvasView,
}

#[derive(Serialize)]
struct CursorResponse {
    cursor: Option<CursorPosition>,
    canvas: CanvasView,
}

#[derive(Serialize)]
struct PatchResponse {
    chat_id: String,
    patch: String,
}

#[derive(Serialize)]
struct ContinueResponse {
    lineage_id: String,
    state: LooplitState,
}

// ---------------------------------------------------------------------------
// Routes
// ---------------------------------------------------------------------------

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/canvas", post(open_canvas))
        .route("/api/canvas/:id", get(get_canvas).delete(close_canvas))
        .route("/api/canvas/:id/state_edit", post(state_edit))
        .route("/api/canvas/:id/messages", post(push_message))
        .route("/api/canvas/:id/resolve", post(resolve_conflict))
        .route("/api/canvas/:id/bulk", post(bulk_resolve))
        .route("/api/canvas/:id/buffer", put(edit_buffer))
        .route("/api/canvas/:id/patch", get(get_patch))
        .route("/api/canvas/:id/continue", post(continue_canvas))
}

async fn open_canvas(
    State(state): State<Arc<AppState>>,
    Json(body): Json<OpenCanvasRequest>,
) -> Result<(StatusCode, Json<CanvasView>), AppError> {
    let doc = match body.state {
        Some(doc) => doc,
        None => base_state(&state, &body.lineage_id)
            .await
            .ok_or_else(|| SnapshotError::LineageNotFound(body.lineage_id.clone()))?,
    };
    let text = serde_json::to_string_pretty(&doc)
        .map_err(|e| AppError::Internal(format!("failed to render state: {}", e)))?;

    let canvas = CanvasSession::open(&body.lineage_id, &text, &body.context)
        .with_labels(state.config.canvas.labels());
    let view = canvas.view();
    state
        .canvases
        .write()
        .await
        .insert(view.chat_id.clone(), canvas);

    broadcast_canvas(&state, &view);
    Ok((StatusCode::CREATED, Json(view)))
}

async fn get_canvas(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CanvasView>, AppError> {
    let canvases = state.canvases.read().await;
    let canvas = canvases.get(&id).ok_or_else(|| canvas_not_found(&id))?;
    Ok(Json(canvas.view()))
}

async fn state_edit(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<StateEditRequest>,
) -> Result<Json<StateEditResponse>, AppError> {
    let (applied, canvas) = update_canvas(&state, Some(&id), |canvas| {
        Ok(canvas.apply_state_edit(&body.old_str, &body.new_str))
    })
    .await?;
    Ok(Json(StateEditResponse { applied, canvas }))
}

async fn push_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<MessageRequest>,
) -> Result<Json<CanvasView>, AppError> {
    let ((), canvas) = update_canvas(&state, Some(&id), |canvas| {
        Ok(canvas.push_user_message(&body.content)?)
    })
    .await?;
    Ok(Json(canvas))
}

async fn resolve_conflict(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<ResolveRequest>,
) -> Result<Json<CursorResponse>, AppError> {
    let (cursor, canvas) = update_canvas(&state, Some(&id), |canvas| {
        Ok(canvas.resolve(body.index, body.side.into())?)
    })
    .await?;
    Ok(Json(CursorResponse {
        cursor: Some(cursor),
        canvas,
    }))
}

async fn bulk_resolve(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<BulkRequest>,
) -> Result<Json<CursorResponse>, AppError> {
    let (cursor, canvas) =
        update_canvas(&state, Some(&id), |canvas| Ok(canvas.dispatch(body.command)?)).await?;
    Ok(Json(CursorResponse { cursor, canvas }))
}

async fn edit_buffer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(body): Json<BufferRequest>,
) -> Result<Json<CanvasView>, AppError> {
    let ((), canvas) =
        update_canvas(&state, Some(&id), |canvas| Ok(canvas.edit_buffer(&body.text)?)).await?;
    Ok(Json(canvas))
}

async fn get_patch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<PatchResponse>, AppError> {
    let canvases = state.canvases.read().await;
    let canvas = canvases.get(&id).ok_or_else(|| canvas_not_found(&id))?;
    Ok(Json(PatchResponse {
        chat_id: id.clone(),
        patch: canvas.pending_patch(),
    }))
}

async fn continue_canvas(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ContinueResponse>, AppError> {
    let mut canvases = state.canvases.write().await;
    let canvas = canvases.get(&id).ok_or_else(|| canvas_not_found(&id))?;
    let lineage_id = canvas.lineage_id().to_string();

    let base = base_state(&state, &lineage_id).await;
    let edited = canvas.continue_edit(base.as_ref())?;
    canvases.remove(&id);
    drop(canvases);

    state
        .edit_states
        .write()
        .await
        .insert(lineage_id.clone(), edited.clone());

    info!(chat_id = %id, lineage_id = %lineage_id, "canvas applied and closed");
    state.broadcast(serde_json::json!({
        "type": "edit_state",
        "lineage_id": lineage_id,
        "state": edited,
    }));
    state.broadcast(serde_json::json!({ "type": "canvas_closed", "chat_id": id }));

    Ok(Json(ContinueResponse {
        lineage_id,
        state: edited,
    }))
}

async fn close_canvas(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    state
        .canvases
        .write()
        .await
        .remove(&id)
        .ok_or_else(|| canvas_not_found(&id))?;

    info!(chat_id = %id, "canvas discarded");
    state.broadcast(serde_json::json!({ "type": "canvas_closed", "chat_id": id }));

    Ok(Json(serde_json::json!({
        "ok": true,
        "message": format!("canvas {} closed", id),
    })))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Run `f` against one canvas under the write lock, then broadcast the
/// updated view.
///
/// Without a `chat_id` the only open canvas is targeted.
pub(crate) async fn update_canvas<T>(
    state: &AppState,
    chat_id: Option<&str>,
    f: impl FnOnce(&mut CanvasSession) -> Result<T, AppError>,
) -> Result<(T, CanvasView), AppError> {
    let mut canvases = state.canvases.write().await;
    let id = target_canvas(&canvases, chat_id)?;
    let canvas = canvases
        .get_mut(&id)
        .ok_or_else(|| canvas_not_found(&id))?;

    let out = f(canvas)?;
    let view = canvas.view();
    drop(canvases);

    broadcast_canvas(state, &view);
    Ok((out, view))
}

fn target_canvas(
    canvases: &HashMap<String, CanvasSession>,
    chat_id: Option<&str>,
) -> Result<String, AppError> {
    match chat_id {
        Some(id) => Ok(id.to_string()),
        None if canvases.len() == 1 => Ok(canvases.keys().next().cloned().unwrap_or_default()),
        None => Err(AppError::BadRequest(format!(
            "chat_id is required when {} canvases are open",
            canvases.len()
        ))),
    }
}

/// The lineage's current edit state, falling back to its latest recorded
/// state.
pub(crate) async fn base_state(state: &AppState, lineage_id: &str) -> Option<LooplitState> {
    if let Some(edit) = state.edit_states.read().await.get(lineage_id) {
        return Some(edit.clone());
    }
    state
        .history
        .read()
        .await
        .latest_state(lineage_id)
        .ok()
        .cloned()
}

fn broadcast_canvas(state: &AppState, view: &CanvasView) {
    state.broadcast(serde_json::json!({
        "type": "canvas_updated",
        "chat_id": view.chat_id,
        "canvas": view,
    }));
}

fn canvas_not_found(id: &str) -> AppError {
    AppError::NotFound(format!("canvas '{}' not found", id))
}
