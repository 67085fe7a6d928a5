//! Health check endpoint and the shared API error type.

use std::sync::Arc;

use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use looplit_core::errors::{ConflictError, EditorError, SessionError, SnapshotError};

use crate::AppState;

/// Health check response.
#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: String,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/status/health", get(health_check))
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ---------------------------------------------------------------------------
// Shared error type for API handlers
// ---------------------------------------------------------------------------

/// Simple API error type that converts to an Axum response.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    NotFound(String),
    /// The request is valid but the canvas is not in a state to accept it.
    Conflict(String),
    Internal(String),
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (axum::http::StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (axum::http::StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (axum::http::StatusCode::CONFLICT, msg),
            AppError::Internal(msg) => (axum::http::StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, Json(body)).into_response()
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::UnresolvedConflicts(_) | SessionError::Busy => {
                AppError::Conflict(err.to_string())
            }
            SessionError::InvalidState(_) => AppError::BadRequest(err.to_string()),
            SessionError::Editor(editor) => editor.into(),
        }
    }
}

impl From<EditorError> for AppError {
    fn from(err: EditorError) -> Self {
        match err {
            EditorError::ReadOnly => AppError::Conflict(err.to_string()),
            EditorError::Conflict(conflict) => conflict.into(),
        }
    }
}

impl From<ConflictError> for AppError {
    fn from(err: ConflictError) -> Self {
        match err {
            ConflictError::StaleConflict { .. } => AppError::Conflict(err.to_string()),
            ConflictError::IndexOutOfRange { .. } => AppError::BadRequest(err.to_string()),
        }
    }
}

impl From<SnapshotError> for AppError {
    fn from(err: SnapshotError) -> Self {
        match err {
            SnapshotError::LineageNotFound(_) | SnapshotError::FileNotFound(_) => {
                AppError::NotFound(err.to_string())
            }
            SnapshotError::InvalidJson(_) | SnapshotError::ForkIndexOutOfRange { .. } => {
                AppError::BadRequest(err.to_string())
            }
            SnapshotError::IoError(_) => AppError::Internal(err.to_string()),
        }
    }
}
