//! File-backed conflict buffer operations.

use std::path::Path;

use anyhow::{Context, Result};

use looplit_core::conflict::{
    create_conflict_with_labels, ConflictLabels, ConflictResolver, Resolution, ResolvedBuffer,
};

pub fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

pub fn write(path: &Path, text: &str) -> Result<()> {
    std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
}

/// Resolve the conflict at `index`, or every conflict when `index` is `None`.
///
/// Returns `None` when there was nothing to resolve.
pub fn resolve(
    text: &str,
    resolution: Resolution,
    index: Option<usize>,
) -> Result<Option<ResolvedBuffer>> {
    let resolved = match index {
        Some(index) => Some(ConflictResolver::resolve_index(text, index, resolution)?),
        None => ConflictResolver::resolve_all(text, resolution)?,
    };
    Ok(resolved)
}

/// Inject an `old -> new` suggestion. Fails when `old` is not in `text`.
pub fn suggest(text: &str, old: &str, new: &str, labels: &ConflictLabels) -> Result<String> {
    let out = create_conflict_with_labels(text, old, new, labels);
    if out == text {
        anyhow::bail!("text to replace was not found in the buffer");
    }
    Ok(out)
}
