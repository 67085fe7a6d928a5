//! looplit web server and REST API.
//!
//! Provides an Axum-based HTTP server with:
//! - Health endpoint
//! - State canvas API (open, suggest, resolve, continue)
//! - State history API (download, upload, fork)
//! - Runtime event intake over HTTP and WebSocket
//! - WebSocket endpoint for live updates

pub mod api;
pub mod ws;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use looplit_core::config::AppConfig;
use looplit_core::models::LooplitState;
use looplit_core::{CanvasSession, StateHistory};

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub config: AppConfig,
    /// Open canvases keyed by chat id.
    pub canvases: RwLock<HashMap<String, CanvasSession>>,
    /// Recorded runs of every function.
    pub history: RwLock<StateHistory>,
    /// Last applied canvas edit per lineage id.
    pub edit_states: RwLock<HashMap<String, LooplitState>>,
    /// Broadcast channel for live WebSocket updates.
    pub ws_broadcast: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(config: AppConfig, history: StateHistory) -> Self {
        let (ws_tx, _) = broadcast::channel(config.web.broadcast_capacity.max(1));
        Self {
            config,
            canvases: RwLock::new(HashMap::new()),
            history: RwLock::new(history),
            edit_states: RwLock::new(HashMap::new()),
            ws_broadcast: ws_tx,
        }
    }

    /// Push a JSON event to every connected WebSocket client.
    pub fn broadcast(&self, event: serde_json::Value) {
        // No subscribers is not an error.
        let _ = self.ws_broadcast.send(event.to_string());
    }
}

/// The web server.
pub struct WebServer {
    state: Arc<AppState>,
}

impl WebServer {
    /// Create a new web server seeded with `history`.
    pub fn new(config: AppConfig, history: StateHistory) -> Self {
        Self {
            state: Arc::new(AppState::new(config, history)),
        }
    }

    /// Shared state, e.g. to persist the history at shutdown.
    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Build the router with every route and middleware layer.
    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Start the web server, listening on the given address.
    pub async fn start(self, listen_addr: &str) -> anyhow::Result<()> {
        let addr: SocketAddr = listen_addr.parse()?;
        let app = self.router();

        info!(addr = %addr, "starting web server");

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, app).await?;

        Ok(())
    }
}

/// Assemble the application router around `state`.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origins(&state.config.web.allowed_origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE]);
    let max_body = state.config.web.max_body_bytes;

    Router::new()
        // API routes
        .merge(api::status::routes())
        .merge(api::canvas::routes())
        .merge(api::history::routes())
        .merge(api::events::routes())
        // WebSocket
        .merge(ws::routes())
        // Middleware
        .layer(DefaultBodyLimit::max(max_body))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

fn allowed_origins(origins: &[String]) -> AllowOrigin {
    if origins.is_empty() {
        return AllowOrigin::from(tower_http::cors::Any);
    }
    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    AllowOrigin::list(parsed)
}
