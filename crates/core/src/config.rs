//! TOML-based configuration system for looplit.
//!
//! Every section is optional; an empty file yields a working local setup.
//! Values that vary per deployment can be pulled from the environment via
//! `_env` fields resolved by [`AppConfig::resolve_env_vars`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::ConflictLabels;
use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level application configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server process settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// State canvas behaviour.
    #[serde(default)]
    pub canvas: CanvasConfig,

    /// HTTP / WebSocket settings.
    #[serde(default)]
    pub web: WebConfig,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

/// Server process configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (default `127.0.0.1:8000`).
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Environment variable overriding `listen` when set.
    #[serde(default)]
    pub listen_env: Option<String>,

    /// Minimum tracing level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Directory where state-history snapshots are saved.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_listen() -> String {
    "127.0.0.1:8000".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("looplit"))
        .unwrap_or_else(|| PathBuf::from(".looplit"))
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            listen_env: None,
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

// ---------------------------------------------------------------------------
// Canvas
// ---------------------------------------------------------------------------

/// State canvas configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanvasConfig {
    /// Label written after the start marker of synthesized conflicts.
    #[serde(default = "default_current_label")]
    pub current_label: String,

    /// Label written after the end marker of synthesized conflicts.
    #[serde(default = "default_incoming_label")]
    pub incoming_label: String,
}

fn default_current_label() -> String {
    ConflictLabels::default().current
}
fn default_incoming_label() -> String {
    ConflictLabels::default().incoming
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            current_label: default_current_label(),
            incoming_label: default_incoming_label(),
        }
    }
}

impl CanvasConfig {
    pub fn labels(&self) -> ConflictLabels {
        ConflictLabels {
            current: self.current_label.clone(),
            incoming: self.incoming_label.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Web
// ---------------------------------------------------------------------------

/// HTTP / WebSocket configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    /// Maximum request body size in bytes (default 8 MiB; snapshots can be big).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Allowed CORS origins. Empty allows any origin.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Capacity of the live-update broadcast channel.
    #[serde(default = "default_broadcast_capacity")]
    pub broadcast_capacity: usize,
}

fn default_max_body_bytes() -> usize {
    8 * 1024 * 1024
}
fn default_broadcast_capacity() -> usize {
    256
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            max_body_bytes: default_max_body_bytes(),
            allowed_origins: Vec::new(),
            broadcast_capacity: default_broadcast_capacity(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & resolving
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load an [`AppConfig`] from a TOML file at the given path.
    ///
    /// This does **not** resolve environment variables -- call
    /// [`resolve_env_vars`](Self::resolve_env_vars) afterwards.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Apply `_env` overrides. A referenced but unset variable logs a
    /// warning and keeps the file value.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref env_name) = self.server.listen_env {
            if let Some(listen) = resolve_optional_env(env_name, "server.listen_env") {
                self.server.listen = listen;
            }
        }
        Ok(())
    }

    /// Validate that all fields are sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.listen.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "server.listen".into(),
                detail: format!("'{}' is not a socket address", self.server.listen),
            });
        }
        if self.server.log_level.parse::<tracing::Level>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "server.log_level".into(),
                detail: "must be one of trace, debug, info, warn, error".into(),
            });
        }
        for (field, label) in [
            ("canvas.current_label", &self.canvas.current_label),
            ("canvas.incoming_label", &self.canvas.incoming_label),
        ] {
            if label.contains('\n') {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "labels must fit on the marker line".into(),
                });
            }
        }
        if self.web.broadcast_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "web.broadcast_capacity".into(),
                detail: "broadcast capacity must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }
}

/// Try to read an environment variable by name. Returns `Some(value)` on
/// success; logs a warning and returns `None` if the variable is unset.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[server]
listen = "0.0.0.0:9000"
log_level = "debug"
data_dir = "/tmp/looplit"

[canvas]
current_label = "Yours"
incoming_label = "Assistant"

[web]
max_body_bytes = 1048576
allowed_origins = ["http://localhost:5173"]
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        assert_eq!(config.server.listen, "0.0.0.0:9000");
        assert_eq!(config.server.data_dir, PathBuf::from("/tmp/looplit"));
        assert_eq!(config.canvas.labels().incoming, "Assistant");
        assert_eq!(config.web.allowed_origins, vec!["http://localhost:5173"]);
        assert_eq!(config.web.broadcast_capacity, 256);
        config.validate().unwrap();
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("looplit.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.server.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/looplit.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[server\nlisten = 1").unwrap();
        let result = AppConfig::load_from_file(&path);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validate_rejects_bad_listen() {
        let mut config = AppConfig::default();
        config.server.listen = "localhost".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "server.listen"
        ));
    }

    #[test]
    fn test_validate_rejects_bad_level_and_label() {
        let mut config = AppConfig::default();
        config.server.log_level = "loud".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "server.log_level"
        ));

        let mut config = AppConfig::default();
        config.canvas.incoming_label = "two\nlines".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "canvas.incoming_label"
        ));
    }

    #[test]
    fn test_listen_env_override() {
        std::env::set_var("TEST_LOOPLIT_LISTEN", "127.0.0.1:4242");

        let mut config: AppConfig =
            toml::from_str("[server]\nlisten_env = \"TEST_LOOPLIT_LISTEN\"\n").unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:4242");

        std::env::remove_var("TEST_LOOPLIT_LISTEN");

        let mut config: AppConfig =
            toml::from_str("[server]\nlisten_env = \"TEST_LOOPLIT_UNSET\"\n").unwrap();
        config.resolve_env_vars().unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8000");
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:8000");
        assert_eq!(config.server.log_level, "info");
        assert_eq!(config.canvas.current_label, "Current");
        assert_eq!(config.canvas.incoming_label, "AI suggestion");
        assert_eq!(config.web.max_body_bytes, 8 * 1024 * 1024);
        config.validate().unwrap();
    }
}
