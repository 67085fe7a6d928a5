//! Canvas session orchestration.
//!
//! A [`CanvasSession`] owns one editing session on a lineage's state: the
//! snapshot taken when the canvas opened, the live AI-edited buffer, the
//! chat transcript with the canvas assistant, and the running / error
//! flags. Suggestions from the assistant arrive as `old -> new` edits and
//! are injected into the live buffer as conflict regions.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::conflict::{
    create_conflict_with_labels, Conflict, ConflictLabels, CursorPosition, Resolution,
};
use crate::editor::{BulkActions, BulkCommand, EditorWidget, MergeEditor, TextBuffer};
use crate::errors::SessionError;
use crate::models::{ChatMessage, ChatRole, LooplitState};

/// Serializable view of a canvas for front-ends.
#[derive(Debug, Clone, Serialize)]
pub struct CanvasView {
    pub chat_id: String,
    pub lineage_id: String,
    pub context: String,
    pub ai_state: String,
    pub orig_state: String,
    pub messages: Vec<ChatMessage>,
    pub running: bool,
    pub error: Option<String>,
    pub conflicts: Vec<Conflict>,
    pub bulk_actions: Option<BulkActions>,
    pub opened_at: DateTime<Utc>,
}

/// One open state canvas.
pub struct CanvasSession<W: EditorWidget = TextBuffer> {
    chat_id: String,
    lineage_id: String,
    context: String,
    orig_state: String,
    ai_state: String,
    messages: Vec<ChatMessage>,
    running: bool,
    error: Option<String>,
    labels: ConflictLabels,
    editor: MergeEditor<W>,
    opened_at: DateTime<Utc>,
}

impl CanvasSession<TextBuffer> {
    /// Open a canvas on `state_text` backed by an in-memory buffer.
    pub fn open(lineage_id: &str, state_text: &str, context: &str) -> Self {
        Self::open_with(TextBuffer::default(), lineage_id, state_text, context)
    }
}

impl<W: EditorWidget> CanvasSession<W> {
    /// Open a canvas on `state_text`, mounting it in `widget`.
    pub fn open_with(widget: W, lineage_id: &str, state_text: &str, context: &str) -> Self {
        let editor = MergeEditor::mount(widget, state_text, false);
        let session = Self {
            chat_id: Uuid::new_v4().to_string(),
            lineage_id: lineage_id.to_string(),
            context: context.to_string(),
            orig_state: state_text.to_string(),
            ai_state: editor.value(),
            messages: Vec::new(),
            running: false,
            error: None,
            labels: ConflictLabels::default(),
            editor,
            opened_at: Utc::now(),
        };
        info!(chat_id = %session.chat_id, lineage_id, "canvas opened");
        session
    }

    /// Use custom marker labels for synthesized conflicts.
    pub fn with_labels(mut self, labels: ConflictLabels) -> Self {
        self.labels = labels;
        self
    }

    pub fn chat_id(&self) -> &str {
        &self.chat_id
    }

    pub fn lineage_id(&self) -> &str {
        &self.lineage_id
    }

    /// Live buffer text.
    pub fn ai_state(&self) -> &str {
        &self.ai_state
    }

    /// State text as it was when the canvas opened.
    pub fn orig_state(&self) -> &str {
        &self.orig_state
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn conflicts(&self) -> &[Conflict] {
        self.editor.conflicts()
    }

    /// Derived from the live conflict list on every call.
    pub fn bulk_actions(&self) -> Option<BulkActions> {
        self.editor.bulk_actions()
    }

    pub fn editor(&self) -> &MergeEditor<W> {
        &self.editor
    }

    /// Inject the assistant's `old -> new` suggestion as a conflict region.
    ///
    /// Returns `false` when `old` is not in the buffer; the buffer is then
    /// left untouched.
    pub fn apply_state_edit(&mut self, old: &str, new: &str) -> bool {
        let updated = create_conflict_with_labels(&self.ai_state, old, new, &self.labels);
        if updated == self.ai_state {
            debug!(chat_id = %self.chat_id, "state edit did not apply, buffer unchanged");
            return false;
        }

        self.editor.sync_external(&updated);
        self.ai_state = self.editor.value();
        info!(
            chat_id = %self.chat_id,
            conflicts = self.conflicts().len(),
            "state edit suggestion injected"
        );
        true
    }

    /// Replace the buffer with a user edit.
    pub fn edit_buffer(&mut self, text: &str) -> Result<(), SessionError> {
        self.editor.edit(text)?;
        self.ai_state = self.editor.value();
        Ok(())
    }

    /// Resolve one conflict of the live buffer.
    pub fn resolve(
        &mut self,
        index: usize,
        resolution: Resolution,
    ) -> Result<CursorPosition, SessionError> {
        let cursor = self.editor.accept(index, resolution)?;
        self.ai_state = self.editor.value();
        Ok(cursor)
    }

    /// Dispatch a bulk command against the conflicts present right now.
    pub fn dispatch(
        &mut self,
        command: BulkCommand,
    ) -> Result<Option<CursorPosition>, SessionError> {
        let cursor = self.editor.apply_bulk(command)?;
        self.ai_state = self.editor.value();
        info!(chat_id = %self.chat_id, ?command, "bulk command applied");
        Ok(cursor)
    }

    /// Add a user message to the transcript.
    pub fn push_user_message(&mut self, content: &str) -> Result<(), SessionError> {
        if self.running {
            return Err(SessionError::Busy);
        }
        self.messages.push(ChatMessage {
            role: ChatRole::User,
            content: content.to_string(),
        });
        Ok(())
    }

    /// The assistant started; the buffer turns read-only.
    pub fn agent_started(&mut self) {
        self.running = true;
        self.error = None;
        self.editor.set_read_only(true);
        debug!(chat_id = %self.chat_id, "canvas agent started");
    }

    /// The assistant finished with a reply and/or an error.
    pub fn agent_finished(&mut self, response: Option<String>, error: Option<String>) {
        self.running = false;
        self.editor.set_read_only(false);

        if let Some(content) = response.filter(|r| !r.is_empty()) {
            self.messages.push(ChatMessage {
                role: ChatRole::Assistant,
                content,
            });
        }
        if let Some(err) = &error {
            warn!(chat_id = %self.chat_id, error = %err, "canvas agent failed");
        }
        self.error = error;
    }

    /// Unified diff between the opening snapshot and the live buffer.
    pub fn pending_patch(&self) -> String {
        diffy::create_patch(&self.orig_state, &self.ai_state).to_string()
    }

    /// Finish the canvas: parse the buffer as a state document and overlay it
    /// on `base`, the lineage's current edit state if any.
    ///
    /// Fails while the assistant runs or while conflicts remain.
    pub fn continue_edit(&self, base: Option<&LooplitState>) -> Result<LooplitState, SessionError> {
        if self.running {
            return Err(SessionError::Busy);
        }
        let remaining = self.conflicts().len();
        if remaining > 0 {
            return Err(SessionError::UnresolvedConflicts(remaining));
        }

        let edited: LooplitState = serde_json::from_str(&self.ai_state)?;
        let state = match base {
            Some(base) => base.merged_with(edited),
            None => edited,
        };
        info!(chat_id = %self.chat_id, lineage_id = %self.lineage_id, "canvas modifications applied");
        Ok(state)
    }

    pub fn view(&self) -> CanvasView {
        CanvasView {
            chat_id: self.chat_id.clone(),
            lineage_id: self.lineage_id.clone(),
            context: self.context.clone(),
            ai_state: self.ai_state.clone(),
            orig_state: self.orig_state.clone(),
            messages: self.messages.clone(),
            running: self.running,
            error: self.error.clone(),
            conflicts: self.conflicts().to_vec(),
            bulk_actions: self.bulk_actions(),
            opened_at: self.opened_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::EditorError;

    const STATE: &str = "{\n  \"messages\": [\n    {\"role\": \"system\", \"content\": \"Be terse.\"}\n  ],\n  \"tools\": []\n}";

    #[test]
    fn test_state_edit_injects_conflict() {
        let mut canvas = CanvasSession::open("l1", STATE, "");
        assert!(canvas.bulk_actions().is_none());

        assert!(canvas.apply_state_edit("Be terse.", "Be terse and polite."));
        assert_eq!(canvas.conflicts().len(), 1);
        assert!(canvas.bulk_actions().is_some());
        assert!(canvas.ai_state().contains("<<<<<<< Current"));
        assert_eq!(canvas.orig_state(), STATE);
    }

    #[test]
    fn test_missing_target_is_noop() {
        let mut canvas = CanvasSession::open("l1", STATE, "");
        assert!(!canvas.apply_state_edit("not there", "x"));
        assert_eq!(canvas.ai_state(), STATE);
    }

    #[test]
    fn test_accept_all_then_continue() {
        let mut canvas = CanvasSession::open("l1", STATE, "");
        canvas.apply_state_edit("Be terse.", "Be terse and polite.");
        assert!(matches!(
            canvas.continue_edit(None),
            Err(SessionError::UnresolvedConflicts(1))
        ));

        canvas.dispatch(BulkCommand::AcceptAll).unwrap();
        assert!(canvas.bulk_actions().is_none());

        let state = canvas.continue_edit(None).unwrap();
        assert_eq!(
            state.messages[0]["content"],
            serde_json::json!("Be terse and polite.")
        );
        assert!(canvas.pending_patch().contains("+    {\"role\": \"system\", \"content\": \"Be terse and polite.\"}"));
    }

    #[test]
    fn test_reject_all_restores_original() {
        let mut canvas = CanvasSession::open("l1", STATE, "");
        canvas.apply_state_edit("Be terse.", "Be verbose.");
        canvas.dispatch(BulkCommand::RejectAll).unwrap();
        assert_eq!(canvas.ai_state(), STATE);
    }

    #[test]
    fn test_running_makes_canvas_read_only() {
        let mut canvas = CanvasSession::open("l1", STATE, "");
        canvas.push_user_message("make it polite").unwrap();
        canvas.agent_started();

        // Suggestions still land while the assistant runs.
        assert!(canvas.apply_state_edit("Be terse.", "Be polite."));
        assert!(matches!(
            canvas.resolve(0, Resolution::AcceptIncoming),
            Err(SessionError::Editor(EditorError::ReadOnly))
        ));
        assert!(matches!(canvas.push_user_message("again"), Err(SessionError::Busy)));
        assert!(matches!(canvas.continue_edit(None), Err(SessionError::Busy)));

        canvas.agent_finished(Some("Updated the system prompt.".into()), None);
        assert!(!canvas.is_running());
        assert_eq!(canvas.messages().len(), 2);
        assert_eq!(canvas.messages()[1].role, ChatRole::Assistant);

        canvas.resolve(0, Resolution::AcceptIncoming).unwrap();
        assert!(canvas.conflicts().is_empty());
    }

    #[test]
    fn test_agent_error_recorded() {
        let mut canvas = CanvasSession::open("l1", STATE, "");
        canvas.agent_started();
        canvas.agent_finished(None, Some("rate limited".into()));
        assert_eq!(canvas.error(), Some("rate limited"));
        assert!(canvas.messages().is_empty());

        canvas.agent_started();
        assert!(canvas.error().is_none());
    }

    #[test]
    fn test_continue_merges_over_base() {
        let mut canvas = CanvasSession::open("l1", STATE, "");
        canvas.edit_buffer("{\"messages\": [], \"tools\": [1]}").unwrap();

        let base: LooplitState =
            serde_json::from_str(r#"{"id":"l1","messages":[1],"tools":[],"model":"m"}"#).unwrap();
        let state = canvas.continue_edit(Some(&base)).unwrap();
        assert_eq!(state.id, "l1");
        assert!(state.messages.is_empty());
        assert_eq!(state.tools.len(), 1);
        assert_eq!(state.extra["model"], serde_json::json!("m"));
    }

    #[test]
    fn test_continue_rejects_invalid_json() {
        let mut canvas = CanvasSession::open("l1", STATE, "");
        canvas.edit_buffer("{ not json").unwrap();
        assert!(matches!(
            canvas.continue_edit(None),
            Err(SessionError::InvalidState(_))
        ));
    }

    #[test]
    fn test_view_reflects_live_state() {
        let mut canvas = CanvasSession::open("l1", STATE, "system prompt");
        canvas.apply_state_edit("\"tools\": []", "\"tools\": [\"search\"]");
        let view = canvas.view();
        assert_eq!(view.lineage_id, "l1");
        assert_eq!(view.context, "system prompt");
        assert_eq!(view.conflicts.len(), 1);
        assert_eq!(view.bulk_actions.unwrap().remaining, 1);
    }
}
