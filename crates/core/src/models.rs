//! Domain model types used throughout looplit.
//!
//! These types bridge the canvas sessions, the state-history store, and the
//! web API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Agent state
// ---------------------------------------------------------------------------

/// One snapshot of a stateful function's state.
///
/// `messages` and `tools` are kept as raw JSON since their shape depends on
/// the model provider. Unknown top-level fields survive a round trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LooplitState {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub messages: Vec<Value>,
    #[serde(default)]
    pub tools: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LooplitState {
    /// Overlay the fields of `other` on top of `self`.
    ///
    /// Fields present in `other` win; extra fields missing from `other` are
    /// kept. An empty `id` in `other` keeps the existing id.
    pub fn merged_with(&self, other: LooplitState) -> LooplitState {
        let mut extra = self.extra.clone();
        extra.extend(other.extra);
        LooplitState {
            id: if other.id.is_empty() {
                self.id.clone()
            } else {
                other.id
            },
            messages: other.messages,
            tools: other.tools,
            extra,
        }
    }
}

// ---------------------------------------------------------------------------
// Canvas chat
// ---------------------------------------------------------------------------

/// Author of a canvas chat message.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

impl std::fmt::Display for ChatRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One message of the canvas chat transcript.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

// ---------------------------------------------------------------------------
// Runtime events
// ---------------------------------------------------------------------------

/// Events pushed by the agent runtime over the live channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuntimeEvent {
    /// The canvas assistant suggests replacing `old_str` with `new_str`.
    StateEdit {
        #[serde(default)]
        chat_id: Option<String>,
        old_str: String,
        new_str: String,
    },
    /// A function produced a new state on a lineage.
    OutputState {
        func_name: String,
        lineage_id: String,
        state: LooplitState,
    },
    /// A tool call spawned a nested run on a lineage.
    MapTcToLid { tc: String, lid: String },
    /// The canvas assistant started working.
    CanvasAgentStart {
        #[serde(default)]
        chat_id: Option<String>,
    },
    /// The canvas assistant finished, with its reply or an error.
    CanvasAgentEnd {
        #[serde(default)]
        chat_id: Option<String>,
        #[serde(default)]
        response: Option<String>,
        #[serde(default)]
        error: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_keeps_unknown_fields() {
        let json = r#"{"id":"l1","messages":[{"role":"user","content":"hi"}],"tools":[],"temperature":0.2}"#;
        let state: LooplitState = serde_json::from_str(json).unwrap();
        assert_eq!(state.messages.len(), 1);
        assert_eq!(state.extra["temperature"], serde_json::json!(0.2));

        let back = serde_json::to_value(&state).unwrap();
        assert_eq!(back["temperature"], serde_json::json!(0.2));
    }

    #[test]
    fn test_merged_with() {
        let base: LooplitState =
            serde_json::from_str(r#"{"id":"l1","messages":[1],"tools":[],"keep":true}"#).unwrap();
        let edit: LooplitState =
            serde_json::from_str(r#"{"messages":[2,3],"tools":[4]}"#).unwrap();
        let merged = base.merged_with(edit);
        assert_eq!(merged.id, "l1");
        assert_eq!(merged.messages.len(), 2);
        assert_eq!(merged.tools.len(), 1);
        assert_eq!(merged.extra["keep"], serde_json::json!(true));
    }

    #[test]
    fn test_runtime_event_tags() {
        let event: RuntimeEvent =
            serde_json::from_str(r#"{"type":"state_edit","old_str":"a","new_str":"b"}"#).unwrap();
        assert_eq!(
            event,
            RuntimeEvent::StateEdit {
                chat_id: None,
                old_str: "a".into(),
                new_str: "b".into(),
            }
        );

        let event: RuntimeEvent =
            serde_json::from_str(r#"{"type":"map_tc_to_lid","tc":"call_1","lid":"l2"}"#).unwrap();
        assert!(matches!(event, RuntimeEvent::MapTcToLid { .. }));
    }
}
