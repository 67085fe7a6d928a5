//! Error types for the looplit core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.
//!
//! Note that the conflict parser and synthesizer never fail: malformed
//! markers are dropped and a missing substring leaves the document as-is.
//! Only contract violations (resolving against a stale buffer) and the
//! surrounding session / persistence layers produce errors.

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error(transparent)]
    Editor(#[from] EditorError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

// ---------------------------------------------------------------------------
// Conflict errors
// ---------------------------------------------------------------------------

/// Errors from the conflict resolution engine.
#[derive(Debug, Error)]
pub enum ConflictError {
    /// The conflict's recorded marker lines no longer match the buffer.
    /// The buffer must be re-parsed before resolving.
    #[error("stale conflict at line {header_line}: buffer was edited without re-parsing")]
    StaleConflict { header_line: usize },

    /// A conflict index outside the parsed conflict list.
    #[error("conflict index {index} out of range ({count} conflicts present)")]
    IndexOutOfRange { index: usize, count: usize },
}

// ---------------------------------------------------------------------------
// Editor errors
// ---------------------------------------------------------------------------

/// Errors from the merge editor surface.
#[derive(Debug, Error)]
pub enum EditorError {
    /// The editor is read-only; edits and resolution actions are disabled.
    #[error("editor is read-only")]
    ReadOnly,

    /// Resolution against the live buffer failed.
    #[error("editor conflict error: {0}")]
    Conflict(#[from] ConflictError),
}

// ---------------------------------------------------------------------------
// Session errors
// ---------------------------------------------------------------------------

/// Errors from canvas session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The canvas still has unresolved conflicts.
    #[error("{0} unresolved conflict(s) remain in the canvas")]
    UnresolvedConflicts(usize),

    /// The agent is running; the canvas is read-only.
    #[error("canvas is busy: the assistant is still running")]
    Busy,

    /// The canvas text is not a valid state document.
    #[error("failed to parse canvas state: {0}")]
    InvalidState(#[from] serde_json::Error),

    /// The merge editor rejected the operation.
    #[error("canvas editor error: {0}")]
    Editor(#[from] EditorError),
}

// ---------------------------------------------------------------------------
// Snapshot errors
// ---------------------------------------------------------------------------

/// Errors from saving and restoring state-history snapshots.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot file does not exist.
    #[error("snapshot file not found: {0}")]
    FileNotFound(String),

    /// The snapshot is not valid JSON or has the wrong shape.
    #[error("invalid snapshot JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// A fork was requested from a lineage that is not known.
    #[error("lineage not found: {0}")]
    LineageNotFound(String),

    /// A fork index past the end of the forked state's messages.
    #[error("fork index {index} out of range (state has {limit} messages)")]
    ForkIndexOutOfRange { index: usize, limit: usize },

    /// Generic I/O error reading or writing the snapshot.
    #[error("snapshot I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ConflictError::StaleConflict { header_line: 4 };
        assert!(err.to_string().contains("line 4"));

        let err = ConflictError::IndexOutOfRange { index: 3, count: 1 };
        assert_eq!(
            err.to_string(),
            "conflict index 3 out of range (1 conflicts present)"
        );

        let err = SessionError::UnresolvedConflicts(2);
        assert!(err.to_string().starts_with("2 unresolved"));

        let err = ConfigError::InvalidValue {
            field: "server.listen".into(),
            detail: "bad".into(),
        };
        assert!(err.to_string().contains("server.listen"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let core_err: CoreError = ConflictError::StaleConflict { header_line: 0 }.into();
        assert!(matches!(core_err, CoreError::Conflict(_)));

        let core_err: CoreError = SnapshotError::LineageNotFound("x".into()).into();
        assert!(matches!(core_err, CoreError::Snapshot(_)));
    }
}
