//! looplit server entry point.
//!
//! Loads configuration, restores the saved state history, starts the web
//! server, and saves the history again on graceful shutdown.

mod signals;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use looplit_core::config::AppConfig;
use looplit_core::errors::CoreError;
use looplit_core::StateHistory;
use looplit_web::WebServer;

/// File name of the history snapshot inside the data directory.
const HISTORY_FILE: &str = "state_history.json";

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// looplit state canvas server.
#[derive(Parser, Debug)]
#[command(
    name = "looplit-server",
    version,
    about = "Serve the looplit state canvas API and live runtime channel"
)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Load this snapshot instead of the one in the data directory.
    #[arg(long)]
    history: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref()).context("failed to load configuration")?;

    // Initialize tracing
    let log_level = args
        .log_level
        .as_deref()
        .unwrap_or(&config.server.log_level);

    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    let snapshot_path = args
        .history
        .clone()
        .unwrap_or_else(|| config.server.data_dir.join(HISTORY_FILE));

    // Startup banner
    info!("========================================");
    info!("  looplit server v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    match &args.config {
        Some(path) => info!("Config file   : {}", path.display()),
        None => info!("Config file   : (defaults)"),
    }
    info!("Listen        : {}", config.server.listen);
    info!("Data dir      : {}", config.server.data_dir.display());
    info!("Snapshot      : {}", snapshot_path.display());
    info!("Labels        : {} / {}", config.canvas.current_label, config.canvas.incoming_label);
    info!("Log level     : {}", log_level);
    info!("========================================");

    std::fs::create_dir_all(&config.server.data_dir).context("failed to create data directory")?;

    let history = load_history(&snapshot_path).with_context(|| {
        format!("failed to load state history from {}", snapshot_path.display())
    })?;

    let web_server = WebServer::new(config.clone(), history);
    let app_state = web_server.state();
    let listen_addr = config.server.listen.clone();

    let web_handle = tokio::spawn(async move {
        if let Err(e) = web_server.start(&listen_addr).await {
            error!("Web server error: {}", e);
        }
    });

    signals::wait_for_shutdown().await;

    info!("Shutdown signal received, stopping...");
    web_handle.abort();

    let history = app_state.history.read().await;
    match history.save(&snapshot_path) {
        Ok(()) => info!("state history saved to {}", snapshot_path.display()),
        Err(e) => warn!("failed to save state history: {}", e),
    }

    info!("looplit server stopped.");
    Ok(())
}

/// Load the config file, or defaults plus environment overrides without one.
fn load_config(path: Option<&Path>) -> Result<AppConfig, CoreError> {
    match path {
        Some(path) => Ok(AppConfig::load_and_resolve(path)?),
        None => {
            let mut config = AppConfig::default();
            config.resolve_env_vars()?;
            Ok(config)
        }
    }
}

/// Restore a saved snapshot, or start empty when there is none yet.
fn load_history(path: &Path) -> Result<StateHistory, CoreError> {
    if !path.exists() {
        info!("no saved state history, starting empty");
        return Ok(StateHistory::default());
    }
    let history = StateHistory::load(path)?;
    let summary = history.summary();
    info!(
        lineages = summary.lineages,
        states = summary.states,
        "state history restored"
    );
    Ok(history)
}
