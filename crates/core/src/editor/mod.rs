//! Merge editor surface.
//!
//! [`MergeEditor`] coordinates a host text widget with the conflict model:
//! it pads conflict headers with a blank line, re-parses the live buffer on
//! every change, re-applies the conflict bands and per-conflict action
//! affordances, and executes single and bulk resolutions against the live
//! widget content. The widget itself (rendering, input, scrolling) lives
//! behind the [`EditorWidget`] trait.

pub mod buffer;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::conflict::{
    parse_conflicts, Conflict, ConflictResolver, CursorPosition, Resolution, START,
};
use crate::errors::{ConflictError, EditorError};

pub use buffer::TextBuffer;

// ---------------------------------------------------------------------------
// Host widget contract
// ---------------------------------------------------------------------------

/// Visual band kind applied to the lines of a conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BandKind {
    Header,
    Current,
    Incoming,
    Footer,
}

impl BandKind {
    /// CSS-style class name for the band.
    pub fn class_name(&self) -> &'static str {
        match self {
            Self::Header => "conflict-header",
            Self::Current => "current-change",
            Self::Incoming => "incoming-change",
            Self::Footer => "conflict-footer",
        }
    }
}

/// A whole-line highlight over `start_line..=end_line` (0-based).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Decoration {
    pub start_line: usize,
    pub end_line: usize,
    pub kind: BandKind,
}

/// Clickable accept-current / accept-incoming overlay, positioned above the
/// header line of one conflict.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActionWidget {
    pub id: String,
    pub conflict_index: usize,
    pub anchor_line: usize,
    pub actions: [Resolution; 2],
}

/// What the merge editor needs from the host text-editing widget.
pub trait EditorWidget {
    fn value(&self) -> String;
    fn set_value(&mut self, text: &str);
    fn position(&self) -> CursorPosition;
    fn set_position(&mut self, position: CursorPosition);
    /// Atomically replace every band previously applied.
    fn replace_decorations(&mut self, decorations: Vec<Decoration>);
    fn add_content_widget(&mut self, widget: ActionWidget);
    fn remove_content_widget(&mut self, id: &str);
    fn set_read_only(&mut self, read_only: bool);
    /// Scroll so that `line` is visible.
    fn reveal_line(&mut self, line: usize);
}

// ---------------------------------------------------------------------------
// Bulk commands
// ---------------------------------------------------------------------------

/// Bulk action dispatched against the live conflict list at invocation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BulkCommand {
    /// Resolve every conflict to its incoming side.
    AcceptAll,
    /// Resolve every conflict to its current side.
    RejectAll,
}

impl BulkCommand {
    pub fn resolution(&self) -> Resolution {
        match self {
            Self::AcceptAll => Resolution::AcceptIncoming,
            Self::RejectAll => Resolution::AcceptCurrent,
        }
    }
}

/// Bulk actions on offer; present only while conflicts remain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BulkActions {
    pub accept_all: BulkCommand,
    pub reject_all: BulkCommand,
    /// Number of unresolved conflicts when the actions were derived.
    pub remaining: usize,
}

impl BulkActions {
    /// Derive the bulk actions for a parsed conflict list.
    pub fn for_conflicts(conflicts: &[Conflict]) -> Option<Self> {
        if conflicts.is_empty() {
            return None;
        }
        Some(Self {
            accept_all: BulkCommand::AcceptAll,
            reject_all: BulkCommand::RejectAll,
            remaining: conflicts.len(),
        })
    }
}

// ---------------------------------------------------------------------------
// Padding
// ---------------------------------------------------------------------------

/// Insert a blank line before every start marker that is neither the first
/// line nor already preceded by a blank line. Applying it twice is the same
/// as applying it once.
pub fn pad_blank_lines(text: &str) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut padded: Vec<&str> = Vec::with_capacity(lines.len());

    for (i, line) in lines.iter().enumerate() {
        if line.starts_with(START) && i > 0 && !lines[i - 1].trim().is_empty() {
            padded.push("");
        }
        padded.push(line);
    }

    padded.join("\n")
}

// ---------------------------------------------------------------------------
// Merge editor
// ---------------------------------------------------------------------------

/// One open merge editor bound to a host widget.
pub struct MergeEditor<W: EditorWidget> {
    widget: W,
    conflicts: Vec<Conflict>,
    widget_ids: Vec<String>,
    read_only: bool,
}

impl<W: EditorWidget> MergeEditor<W> {
    /// Mount `widget` with the padded `value` and decorate its conflicts.
    pub fn mount(mut widget: W, value: &str, read_only: bool) -> Self {
        widget.set_value(&pad_blank_lines(value));
        widget.set_read_only(read_only);

        let mut editor = Self {
            widget,
            conflicts: Vec::new(),
            widget_ids: Vec::new(),
            read_only,
        };
        editor.refresh();
        debug!(conflicts = editor.conflicts.len(), read_only, "merge editor mounted");
        editor
    }

    /// Conflicts parsed from the live buffer at the last change.
    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// Bulk actions available right now, if any conflict remains.
    pub fn bulk_actions(&self) -> Option<BulkActions> {
        BulkActions::for_conflicts(&self.conflicts)
    }

    pub fn value(&self) -> String {
        self.widget.value()
    }

    pub fn widget(&self) -> &W {
        &self.widget
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Toggle read-only mode. Highlighting stays; affordances follow the flag.
    pub fn set_read_only(&mut self, read_only: bool) {
        if self.read_only == read_only {
            return;
        }
        self.read_only = read_only;
        self.widget.set_read_only(read_only);
        self.refresh();
    }

    /// Change notification from the host: re-parse and re-decorate.
    pub fn on_change(&mut self) {
        self.refresh();
    }

    /// Apply a user edit that replaces the whole buffer.
    pub fn edit(&mut self, text: &str) -> Result<(), EditorError> {
        if self.read_only {
            return Err(EditorError::ReadOnly);
        }
        self.widget.set_value(text);
        self.on_change();
        Ok(())
    }

    /// Resolve the conflict at `index` of the live buffer.
    pub fn accept(
        &mut self,
        index: usize,
        resolution: Resolution,
    ) -> Result<CursorPosition, EditorError> {
        if self.read_only {
            return Err(EditorError::ReadOnly);
        }

        let live = self.widget.value();
        let conflicts = parse_conflicts(&live);
        let conflict = conflicts.get(index).ok_or(ConflictError::IndexOutOfRange {
            index,
            count: conflicts.len(),
        })?;

        let resolved = ConflictResolver::resolve(&live, conflict, resolution)?;
        self.widget.set_value(&resolved.text);
        self.widget.set_position(resolved.cursor);
        self.refresh();

        info!(index, %resolution, remaining = self.conflicts.len(), "conflict resolved in editor");
        Ok(resolved.cursor)
    }

    /// Run a bulk command against the live buffer content.
    ///
    /// Returns the final cursor, or `None` when there was nothing to resolve.
    pub fn apply_bulk(
        &mut self,
        command: BulkCommand,
    ) -> Result<Option<CursorPosition>, EditorError> {
        if self.read_only {
            return Err(EditorError::ReadOnly);
        }

        let live = self.widget.value();
        let Some(resolved) = ConflictResolver::resolve_all(&live, command.resolution())? else {
            return Ok(None);
        };

        self.widget.set_value(&resolved.text);
        self.widget.set_position(resolved.cursor);
        self.widget.reveal_line(resolved.cursor.line);
        self.refresh();
        Ok(Some(resolved.cursor))
    }

    /// Sync with content changed outside the widget.
    ///
    /// The widget is replaced wholesale with the padded content when it
    /// differs. The cursor is kept only when the new content has no
    /// conflicts; otherwise it moves to the first conflict. Returns whether
    /// the widget content changed.
    pub fn sync_external(&mut self, value: &str) -> bool {
        let padded = pad_blank_lines(value);
        if padded == self.widget.value() {
            return false;
        }

        let position = self.widget.position();
        self.widget.set_value(&padded);

        match parse_conflicts(&padded).first() {
            None => self.widget.set_position(position),
            Some(first) => {
                self.widget.set_position(CursorPosition {
                    line: first.header_line,
                    column: 1,
                });
                self.widget.reveal_line(first.header_line);
            }
        }

        self.refresh();
        debug!(conflicts = self.conflicts.len(), "external content synced");
        true
    }

    /// Detach every affordance and hand the widget back.
    pub fn unmount(mut self) -> W {
        self.clear_action_widgets();
        self.widget
    }

    fn clear_action_widgets(&mut self) {
        for id in self.widget_ids.drain(..) {
            self.widget.remove_content_widget(&id);
        }
    }

    /// Re-parse the live buffer and re-apply bands and affordances.
    fn refresh(&mut self) {
        self.conflicts = parse_conflicts(&self.widget.value());
        self.clear_action_widgets();

        let decorations = self.conflicts.iter().flat_map(conflict_bands).collect();
        self.widget.replace_decorations(decorations);

        if self.read_only {
            return;
        }

        for (index, conflict) in self.conflicts.iter().enumerate() {
            let action = ActionWidget {
                id: format!("conflict-actions-{}", index),
                conflict_index: index,
                anchor_line: conflict.header_line,
                actions: [Resolution::AcceptCurrent, Resolution::AcceptIncoming],
            };
            self.widget_ids.push(action.id.clone());
            self.widget.add_content_widget(action);
        }
    }
}

/// Header, current, incoming and footer bands for one conflict. Empty sides
/// get no band.
fn conflict_bands(conflict: &Conflict) -> Vec<Decoration> {
    let mut bands = vec![Decoration {
        start_line: conflict.header_line,
        end_line: conflict.header_line,
        kind: BandKind::Header,
    }];
    if !conflict.current.is_empty() {
        bands.push(Decoration {
            start_line: conflict.header_line + 1,
            end_line: conflict.separator_line - 1,
            kind: BandKind::Current,
        });
    }
    if !conflict.incoming.is_empty() {
        bands.push(Decoration {
            start_line: conflict.separator_line + 1,
            end_line: conflict.footer_line - 1,
            kind: BandKind::Incoming,
        });
    }
    bands.push(Decoration {
        start_line: conflict.footer_line,
        end_line: conflict.footer_line,
        kind: BandKind::Footer,
    });
    bands
}
