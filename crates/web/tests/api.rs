//! Router-level tests for the REST API, driven with `tower::ServiceExt::oneshot`.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use looplit_core::config::AppConfig;
use looplit_core::models::LooplitState;
use looplit_core::StateHistory;
use looplit_web::{build_router, AppState};

// ===========================================================================
// Helpers
// ===========================================================================

fn seeded_state() -> Arc<AppState> {
    let state: LooplitState = serde_json::from_value(json!({
        "id": "lin-1",
        "messages": [{"role": "user", "content": "hello"}],
        "tools": []
    }))
    .unwrap();
    let mut history = StateHistory::default();
    history.append_output_state("lin-1", state);
    Arc::new(AppState::new(AppConfig::default(), history))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn open_canvas(app: &Router) -> String {
    let (status, view) = send(
        app,
        Method::POST,
        "/api/canvas",
        Some(json!({"lineage_id": "lin-1", "context": "be friendlier"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    view["chat_id"].as_str().unwrap().to_string()
}

// ===========================================================================
// Tests
// ===========================================================================

#[tokio::test]
async fn health_reports_ok() {
    let app = build_router(seeded_state());
    let (status, body) = send(&app, Method::GET, "/api/status/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
}

#[tokio::test]
async fn canvas_suggest_resolve_continue() {
    let state = seeded_state();
    let app = build_router(state.clone());
    let mut live = state.ws_broadcast.subscribe();
    let id = open_canvas(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/canvas/{id}/state_edit"),
        Some(json!({"old_str": "\"hello\"", "new_str": "\"hi there\""})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["applied"], true);
    assert_eq!(body["canvas"]["conflicts"].as_array().unwrap().len(), 1);
    assert_eq!(body["canvas"]["bulk_actions"]["remaining"], 1);

    let (status, body) = send(&app, Method::POST, &format!("/api/canvas/{id}/continue"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("unresolved"));

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/canvas/{id}/resolve"),
        Some(json!({"index": 0, "side": "incoming"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["canvas"]["bulk_actions"].is_null());

    let (_, body) = send(&app, Method::GET, &format!("/api/canvas/{id}/patch"), None).await;
    assert!(body["patch"].as_str().unwrap().contains("hi there"));

    let (status, body) = send(&app, Method::POST, &format!("/api/canvas/{id}/continue"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["lineage_id"], "lin-1");
    assert_eq!(body["state"]["messages"][0]["content"], "hi there");

    let (status, _) = send(&app, Method::GET, &format!("/api/canvas/{id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(state.edit_states.read().await.contains_key("lin-1"));

    let first: Value = serde_json::from_str(&live.recv().await.unwrap()).unwrap();
    assert_eq!(first["type"], "canvas_updated");
}

#[tokio::test]
async fn bulk_reject_restores_original() {
    let app = build_router(seeded_state());
    let id = open_canvas(&app).await;

    let (_, opened) = send(&app, Method::GET, &format!("/api/canvas/{id}"), None).await;
    send(
        &app,
        Method::POST,
        &format!("/api/canvas/{id}/state_edit"),
        Some(json!({"old_str": "hello", "new_str": "bye"})),
    )
    .await;

    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/api/canvas/{id}/bulk"),
        Some(json!({"command": "reject_all"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["canvas"]["ai_state"], opened["orig_state"]);
}

#[tokio::test]
async fn runtime_events_drive_the_canvas() {
    let app = build_router(seeded_state());
    let id = open_canvas(&app).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"type": "canvas_agent_start", "chat_id": id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/canvas/{id}/buffer"),
        Some(json!({"text": "{}"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    // A single open canvas is targeted without a chat id.
    send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"type": "state_edit", "old_str": "hello", "new_str": "yo"})),
    )
    .await;
    send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({"type": "canvas_agent_end", "chat_id": id, "response": "Done."})),
    )
    .await;

    let (_, view) = send(&app, Method::GET, &format!("/api/canvas/{id}"), None).await;
    assert_eq!(view["running"], false);
    assert_eq!(view["conflicts"].as_array().unwrap().len(), 1);
    assert_eq!(view["messages"][0]["role"], "assistant");
}

#[tokio::test]
async fn history_upload_fork_and_download() {
    let app = build_router(seeded_state());

    let upload = json!({
        "stateHistoryByLineage": {"a": [{
            "id": "a",
            "messages": [{"role": "user", "content": "hi"}, {"role": "assistant", "content": "yo"}],
            "tools": []
        }]},
        "toolCallsToLineageIds": {"call_1": "a"},
        "forksByMessageIndex": {}
    });
    let (status, summary) = send(&app, Method::PUT, "/api/history", Some(upload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(summary["lineages"], 1);

    let (status, fork) = send(
        &app,
        Method::POST,
        "/api/history/fork",
        Some(json!({"function_id": "chat", "lineage_id": "a", "message_index": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_id = fork["lineage_id"].as_str().unwrap();
    assert_eq!(fork["forks"], json!(["a", new_id]));

    let (_, history) = send(&app, Method::GET, "/api/history", None).await;
    assert_eq!(history["forksByMessageIndex"]["chat"], json!([null, null, ["a", new_id]]));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/history/fork",
        Some(json!({"function_id": "chat", "lineage_id": "missing", "message_index": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fork_past_last_message_is_rejected() {
    let app = build_router(seeded_state());

    for index in [json!(2), json!(1_000_000_000_000u64), json!(u64::MAX)] {
        let (status, body) = send(
            &app,
            Method::POST,
            "/api/history/fork",
            Some(json!({"function_id": "chat", "lineage_id": "lin-1", "message_index": index})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("out of range"));
    }

    let (_, summary) = send(&app, Method::GET, "/api/history/summary", None).await;
    assert_eq!(summary["lineages"], 1);
    assert_eq!(summary["forks"], 0);

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/history/fork",
        Some(json!({"function_id": "chat", "lineage_id": "lin-1", "message_index": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn unknown_lineage_cannot_be_opened() {
    let app = build_router(seeded_state());
    let (status, body) = send(
        &app,
        Method::POST,
        "/api/canvas",
        Some(json!({"lineage_id": "nope"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("nope"));
}
