//! Merge-conflict text model.
//!
//! The conflict subsystem is responsible for:
//! 1. **Parsing** -- extracting conflict regions from a merge buffer.
//! 2. **Synthesis** -- injecting a new region for an `old -> new` suggestion.
//! 3. **Resolution** -- replacing a region with the lines of one side.

pub mod parser;
pub mod resolver;
pub mod synthesizer;

pub use parser::{has_conflicts, parse_conflicts, Conflict, Marker, END, MIDDLE, START};
pub use resolver::{ConflictResolver, CursorPosition, Resolution, ResolvedBuffer};
pub use synthesizer::{create_conflict, create_conflict_with_labels, ConflictLabels};
