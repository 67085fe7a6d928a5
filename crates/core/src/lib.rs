//! looplit core library.
//!
//! This crate provides the building blocks of the state canvas: the
//! merge-conflict text model (parsing, synthesis and resolution), the
//! editor coordinator that drives a host text widget, canvas sessions,
//! the state-history snapshot store, and configuration.

pub mod config;
pub mod conflict;
pub mod editor;
pub mod errors;
pub mod models;
pub mod session;
pub mod snapshot;

// Re-exports for convenience.
pub use config::AppConfig;
pub use editor::{MergeEditor, TextBuffer};
pub use session::CanvasSession;
pub use snapshot::StateHistory;
