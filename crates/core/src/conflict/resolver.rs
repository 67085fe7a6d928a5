//! Conflict resolution actions.
//!
//! The [`ConflictResolver`] replaces one conflict region with the lines of
//! the chosen side. Resolution is a plain line splice with no knowledge of
//! the document format. Line numbers of every conflict below the edited
//! region shift afterwards, so callers re-parse before the next resolution.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::parser::{parse_conflicts, Conflict, END, MIDDLE, START};
use crate::errors::ConflictError;

/// Which side of a conflict to keep.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Keep the current (local) lines.
    AcceptCurrent,
    /// Keep the incoming (AI-suggested) lines.
    AcceptIncoming,
}

impl Resolution {
    /// The lines of `conflict` this resolution keeps.
    pub fn chosen_lines<'a>(&self, conflict: &'a Conflict) -> &'a [String] {
        match self {
            Self::AcceptCurrent => &conflict.current,
            Self::AcceptIncoming => &conflict.incoming,
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AcceptCurrent => write!(f, "accept_current"),
            Self::AcceptIncoming => write!(f, "accept_incoming"),
        }
    }
}

/// Cursor location after an edit.
///
/// `line` is a 0-based line index; `column` is 1-based and points just past
/// the last character of the inserted text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct CursorPosition {
    pub line: usize,
    pub column: usize,
}

/// Buffer text after a resolution, with the suggested cursor location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedBuffer {
    pub text: String,
    pub cursor: CursorPosition,
}

/// Stateless conflict resolution operations.
pub struct ConflictResolver;

impl ConflictResolver {
    /// Replace `conflict` in `buffer` with the lines chosen by `resolution`.
    ///
    /// The replaced range runs from the header line (or the blank line right
    /// above it, when there is one) through the footer line inclusive. The
    /// chosen lines are inserted followed by a single newline.
    pub fn resolve(
        buffer: &str,
        conflict: &Conflict,
        resolution: Resolution,
    ) -> Result<ResolvedBuffer, ConflictError> {
        let lines: Vec<&str> = buffer.split('\n').collect();
        Self::check_fresh(&lines, conflict)?;

        let chosen = resolution.chosen_lines(conflict);
        let range_start = if conflict.has_blank_line_before {
            conflict.header_line - 1
        } else {
            conflict.header_line
        };
        let range_end = conflict.footer_line + 1;

        let mut text = String::with_capacity(buffer.len());
        for line in &lines[..range_start] {
            text.push_str(line);
            text.push('\n');
        }
        text.push_str(&chosen.join("\n"));
        text.push('\n');
        text.push_str(&lines[range_end..].join("\n"));

        let cursor = CursorPosition {
            line: range_start + chosen.len().saturating_sub(1),
            column: chosen.last().map_or(0, |last| last.len()) + 1,
        };

        debug!(
            header_line = conflict.header_line,
            footer_line = conflict.footer_line,
            %resolution,
            kept = chosen.len(),
            "conflict region replaced"
        );

        Ok(ResolvedBuffer { text, cursor })
    }

    /// Resolve the `index`-th conflict of a freshly parsed `buffer`.
    pub fn resolve_index(
        buffer: &str,
        index: usize,
        resolution: Resolution,
    ) -> Result<ResolvedBuffer, ConflictError> {
        let conflicts = parse_conflicts(buffer);
        let conflict = conflicts
            .get(index)
            .ok_or(ConflictError::IndexOutOfRange {
                index,
                count: conflicts.len(),
            })?;
        Self::resolve(buffer, conflict, resolution)
    }

    /// Resolve every conflict in `buffer` in document order, re-parsing the
    /// buffer before each step.
    ///
    /// Returns `None` when the buffer holds no conflicts.
    pub fn resolve_all(
        buffer: &str,
        resolution: Resolution,
    ) -> Result<Option<ResolvedBuffer>, ConflictError> {
        let mut resolved: Option<ResolvedBuffer> = None;
        let mut count = 0usize;

        loop {
            let text = resolved.as_ref().map_or(buffer, |r| r.text.as_str());
            let conflicts = parse_conflicts(text);
            let Some(first) = conflicts.first() else {
                break;
            };
            let next = Self::resolve(text, first, resolution)?;
            resolved = Some(next);
            count += 1;
        }

        if count > 0 {
            info!(count, %resolution, "resolved all conflicts");
        }
        Ok(resolved)
    }

    /// Verify the marker lines recorded in `conflict` are still where the
    /// parser found them.
    fn check_fresh(lines: &[&str], conflict: &Conflict) -> Result<(), ConflictError> {
        let stale = || ConflictError::StaleConflict {
            header_line: conflict.header_line,
        };

        let marker_at = |index: usize, marker: &str| {
            lines.get(index).is_some_and(|line| line.starts_with(marker))
        };

        if !(conflict.header_line < conflict.separator_line
            && conflict.separator_line < conflict.footer_line)
        {
            return Err(stale());
        }
        if !marker_at(conflict.header_line, START)
            || !marker_at(conflict.separator_line, MIDDLE)
            || !marker_at(conflict.footer_line, END)
        {
            return Err(stale());
        }
        if conflict.has_blank_line_before
            && (conflict.header_line == 0 || !lines[conflict.header_line - 1].trim().is_empty())
        {
            return Err(stale());
        }
        Ok(())
    }
}
