//! In-memory [`EditorWidget`] used by the server and the CLI.
//!
//! It keeps the text, cursor, bands and affordances as plain data so they
//! can be serialized to a remote front-end or inspected in tests.

use std::collections::BTreeMap;

use super::{ActionWidget, Decoration, EditorWidget};
use crate::conflict::CursorPosition;

#[derive(Debug, Clone, Default)]
pub struct TextBuffer {
    text: String,
    position: CursorPosition,
    decorations: Vec<Decoration>,
    widgets: BTreeMap<String, ActionWidget>,
    read_only: bool,
    revealed_line: Option<usize>,
}

impl TextBuffer {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn decorations(&self) -> &[Decoration] {
        &self.decorations
    }

    /// Attached affordances, ordered by anchor line.
    pub fn action_widgets(&self) -> Vec<&ActionWidget> {
        let mut widgets: Vec<&ActionWidget> = self.widgets.values().collect();
        widgets.sort_by_key(|w| w.anchor_line);
        widgets
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Last line scrolled into view, if any.
    pub fn revealed_line(&self) -> Option<usize> {
        self.revealed_line
    }

    fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }
}

impl EditorWidget for TextBuffer {
    fn value(&self) -> String {
        self.text.clone()
    }

    fn set_value(&mut self, text: &str) {
        self.text = text.to_string();
    }

    fn position(&self) -> CursorPosition {
        self.position
    }

    fn set_position(&mut self, position: CursorPosition) {
        let last_line = self.line_count() - 1;
        self.position = CursorPosition {
            line: position.line.min(last_line),
            column: position.column.max(1),
        };
    }

    fn replace_decorations(&mut self, decorations: Vec<Decoration>) {
        self.decorations = decorations;
    }

    fn add_content_widget(&mut self, widget: ActionWidget) {
        self.widgets.insert(widget.id.clone(), widget);
    }

    fn remove_content_widget(&mut self, id: &str) {
        self.widgets.remove(id);
    }

    fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    fn reveal_line(&mut self, line: usize) {
        self.revealed_line = Some(line);
    }
}
