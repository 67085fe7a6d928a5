//! State-history store and its JSON snapshot format.
//!
//! A snapshot holds three maps:
//! - `stateHistoryByLineage`: lineage id -> ordered state snapshots,
//! - `toolCallsToLineageIds`: tool call id -> lineage id of the nested run,
//! - `forksByMessageIndex`: function id -> per-message-index lineage ids.
//!
//! The fork lists are indexed by message position and may be sparse; gaps
//! are written as `null`.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::SnapshotError;
use crate::models::LooplitState;

/// Recorded execution history for every function of one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StateHistory {
    #[serde(default)]
    pub state_history_by_lineage: BTreeMap<String, Vec<LooplitState>>,
    #[serde(default)]
    pub tool_calls_to_lineage_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub forks_by_message_index: BTreeMap<String, Vec<Option<Vec<String>>>>,
}

/// Counts shown when listing a snapshot.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct HistorySummary {
    pub lineages: usize,
    pub states: usize,
    pub tool_calls: usize,
    pub forks: usize,
}

impl StateHistory {
    /// Parse a snapshot from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize as pretty-printed JSON (two-space indent).
    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a snapshot file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading state history snapshot");

        if !path.exists() {
            return Err(SnapshotError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let history = Self::from_json_str(&contents)?;
        debug!(lineages = history.state_history_by_lineage.len(), "snapshot parsed");
        Ok(history)
    }

    /// Write the snapshot to `path`, replacing any existing file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json_pretty()?)?;
        info!(path = %path.display(), "state history snapshot saved");
        Ok(())
    }

    /// Record a new state emitted on `lineage_id`.
    pub fn append_output_state(&mut self, lineage_id: &str, state: LooplitState) {
        let states = self
            .state_history_by_lineage
            .entry(lineage_id.to_string())
            .or_default();
        states.push(state);
        debug!(lineage_id, len = states.len(), "output state recorded");
    }

    /// Remember which lineage a tool call's nested run lives on.
    pub fn map_tool_call(&mut self, tool_call_id: &str, lineage_id: &str) {
        self.tool_calls_to_lineage_ids
            .insert(tool_call_id.to_string(), lineage_id.to_string());
    }

    pub fn lineage(&self, lineage_id: &str) -> Option<&[LooplitState]> {
        self.state_history_by_lineage
            .get(lineage_id)
            .map(Vec::as_slice)
    }

    /// Most recent state recorded on `lineage_id`.
    pub fn latest_state(&self, lineage_id: &str) -> Result<&LooplitState, SnapshotError> {
        self.lineage(lineage_id)
            .and_then(|states| states.last())
            .ok_or_else(|| SnapshotError::LineageNotFound(lineage_id.to_string()))
    }

    pub fn lineage_for_tool_call(&self, tool_call_id: &str) -> Option<&str> {
        self.tool_calls_to_lineage_ids
            .get(tool_call_id)
            .map(String::as_str)
    }

    /// Lineages forked at `message_index` of `function_id`, the original
    /// lineage first.
    pub fn forks_at(&self, function_id: &str, message_index: usize) -> Option<&[String]> {
        self.forks_by_message_index
            .get(function_id)?
            .get(message_index)?
            .as_deref()
    }

    /// Fork execution from `state` at `message_index`.
    ///
    /// Creates a new lineage seeded with a copy of `state` (its id replaced
    /// by the new lineage id) and records the fork. The first fork at an
    /// index also records `current_lineage_id` so the original branch stays
    /// selectable. Returns the new lineage id.
    ///
    /// `message_index` may point at any message of `state` or one past the
    /// last; anything further is rejected with
    /// [`SnapshotError::ForkIndexOutOfRange`] and nothing is recorded.
    pub fn fork(
        &mut self,
        function_id: &str,
        current_lineage_id: &str,
        state: &LooplitState,
        message_index: usize,
    ) -> Result<String, SnapshotError> {
        let limit = state.messages.len();
        let slots = message_index
            .checked_add(1)
            .filter(|_| message_index <= limit)
            .ok_or(SnapshotError::ForkIndexOutOfRange {
                index: message_index,
                limit,
            })?;

        let new_lineage_id = Uuid::new_v4().to_string();

        let mut seeded = state.clone();
        seeded.id = new_lineage_id.clone();
        self.state_history_by_lineage
            .insert(new_lineage_id.clone(), vec![seeded]);

        let forks = self
            .forks_by_message_index
            .entry(function_id.to_string())
            .or_default();
        if forks.len() < slots {
            forks.resize(slots, None);
        }
        forks[message_index]
            .get_or_insert_with(|| vec![current_lineage_id.to_string()])
            .push(new_lineage_id.clone());

        info!(
            function_id,
            from = current_lineage_id,
            to = %new_lineage_id,
            message_index,
            "lineage forked"
        );
        Ok(new_lineage_id)
    }

    pub fn summary(&self) -> HistorySummary {
        HistorySummary {
            lineages: self.state_history_by_lineage.len(),
            states: self.state_history_by_lineage.values().map(Vec::len).sum(),
            tool_calls: self.tool_calls_to_lineage_ids.len(),
            forks: self
                .forks_by_message_index
                .values()
                .flatten()
                .flatten()
                .map(|lineages| lineages.len().saturating_sub(1))
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(id: &str) -> LooplitState {
        LooplitState {
            id: id.into(),
            ..LooplitState::default()
        }
    }

    fn state_with_messages(id: &str, count: usize) -> LooplitState {
        LooplitState {
            messages: (0..count).map(|i| serde_json::json!({ "content": i })).collect(),
            ..state(id)
        }
    }

    #[test]
    fn test_wire_format_keys() {
        let mut history = StateHistory::default();
        history.append_output_state("l1", state("l1"));
        history.map_tool_call("call_1", "l2");
        let json: serde_json::Value =
            serde_json::from_str(&history.to_json_pretty().unwrap()).unwrap();
        assert!(json.get("stateHistoryByLineage").is_some());
        assert_eq!(json["toolCallsToLineageIds"]["call_1"], "l2");
        assert!(json["forksByMessageIndex"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_parse_sparse_forks() {
        let json = r#"{
            "stateHistoryByLineage": {"l1": [{"id": "l1", "messages": [], "tools": []}]},
            "toolCallsToLineageIds": {},
            "forksByMessageIndex": {"f1": [null, null, ["l1", "l2"]]}
        }"#;
        let history = StateHistory::from_json_str(json).unwrap();
        assert_eq!(history.forks_at("f1", 2).unwrap(), ["l1", "l2"]);
        assert!(history.forks_at("f1", 0).is_none());
        assert!(history.forks_at("f1", 9).is_none());
        assert!(history.forks_at("nope", 0).is_none());
    }

    #[test]
    fn test_invalid_json() {
        let err = StateHistory::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, SnapshotError::InvalidJson(_)));
    }

    #[test]
    fn test_fork_records_original_then_new() {
        let mut history = StateHistory::default();
        let from = state_with_messages("l1", 4);
        history.append_output_state("l1", from.clone());

        let first = history.fork("f1", "l1", &from, 3).unwrap();
        let second = history.fork("f1", "l1", &from, 3).unwrap();

        let forks = history.forks_at("f1", 3).unwrap();
        assert_eq!(forks, [String::from("l1"), first.clone(), second]);
        assert_eq!(history.lineage(&first).unwrap()[0].id, first);

        let summary = history.summary();
        assert_eq!(summary.lineages, 3);
        assert_eq!(summary.forks, 2);
    }

    #[test]
    fn test_fork_index_past_messages_is_rejected() {
        let mut history = StateHistory::default();
        let from = state_with_messages("l1", 2);
        history.append_output_state("l1", from.clone());

        for index in [3, 1_000_000_000_000, usize::MAX] {
            let err = history.fork("f1", "l1", &from, index).unwrap_err();
            assert!(matches!(
                err,
                SnapshotError::ForkIndexOutOfRange { index: i, limit: 2 } if i == index
            ));
        }
        assert_eq!(history.summary().lineages, 1);
        assert!(history.forks_by_message_index.is_empty());

        // One past the last message is the append position.
        history.fork("f1", "l1", &from, 2).unwrap();
        assert_eq!(history.forks_by_message_index["f1"].len(), 3);
    }

    #[test]
    fn test_latest_state() {
        let mut history = StateHistory::default();
        history.append_output_state("l1", state("first"));
        history.append_output_state("l1", state("second"));
        assert_eq!(history.latest_state("l1").unwrap().id, "second");
        assert!(matches!(
            history.latest_state("l9"),
            Err(SnapshotError::LineageNotFound(ref id)) if id == "l9"
        ));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent_state.json");

        let mut history = StateHistory::default();
        history.append_output_state("l1", state_with_messages("l1", 1));
        history
            .fork("f1", "l1", &state_with_messages("l1", 1), 1)
            .unwrap();
        history.save(&path).unwrap();

        let loaded = StateHistory::load(&path).unwrap();
        assert_eq!(loaded, history);
        assert_eq!(loaded.to_json_pretty().unwrap(), history.to_json_pretty().unwrap());
    }

    #[test]
    fn test_load_missing_file() {
        let err = StateHistory::load("/nonexistent/looplit/state.json").unwrap_err();
        assert!(matches!(err, SnapshotError::FileNotFound(_)));
    }
}
