//! REST API endpoint modules.

pub mod canvas;
pub mod events;
pub mod history;
pub mod status;
