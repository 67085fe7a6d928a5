//! Conflict synthesis: turn a single `old -> new` edit suggestion into an
//! inline conflict region inside the document.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::parser::{END, MIDDLE, START};

/// Labels written after the start and end markers. The parser ignores them;
/// they are only shown to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConflictLabels {
    pub current: String,
    pub incoming: String,
}

impl Default for ConflictLabels {
    fn default() -> Self {
        Self {
            current: "Current".into(),
            incoming: "AI suggestion".into(),
        }
    }
}

/// Wrap the first occurrence of `old` in `document` in a conflict region
/// whose incoming side is `new`, using the default labels.
///
/// Returns `document` unchanged when `old` does not occur.
pub fn create_conflict(document: &str, old: &str, new: &str) -> String {
    create_conflict_with_labels(document, old, new, &ConflictLabels::default())
}

/// Same as [`create_conflict`] with explicit marker labels.
///
/// The text between the start of the matched line and the match is kept as
/// a verbatim prefix on both sides, and the rest of the last matched line as
/// a verbatim suffix, so either side resolves to complete lines. Everything
/// outside the matched lines is copied byte-for-byte.
///
/// A match in the middle of a line therefore expands to the whole line: the
/// text after the match sits before the end marker, not after it.
pub fn create_conflict_with_labels(
    document: &str,
    old: &str,
    new: &str,
    labels: &ConflictLabels,
) -> String {
    if old.is_empty() {
        debug!("empty suggestion target, document left unchanged");
        return document.to_string();
    }

    let Some(match_start) = document.find(old) else {
        debug!(old_len = old.len(), "suggestion target not found, document left unchanged");
        return document.to_string();
    };
    let match_end = match_start + old.len();

    let line_start = document[..match_start]
        .rfind('\n')
        .map_or(0, |newline| newline + 1);
    let line_end = document[match_end..]
        .find('\n')
        .map_or(document.len(), |newline| match_end + newline);
    let indentation = &document[line_start..match_start];
    let suffix = &document[match_end..line_end];

    let mut out = String::with_capacity(
        document.len() + new.len() + indentation.len() + suffix.len() + 64,
    );
    out.push_str(&document[..line_start]);
    push_marker(&mut out, START, &labels.current);
    out.push('\n');
    out.push_str(indentation);
    out.push_str(old);
    out.push_str(suffix);
    out.push('\n');
    out.push_str(MIDDLE);
    out.push('\n');
    out.push_str(indentation);
    out.push_str(new);
    out.push_str(suffix);
    out.push('\n');
    push_marker(&mut out, END, &labels.incoming);
    out.push_str(&document[line_end..]);

    debug!(line_start, "conflict region synthesized");
    out
}

fn push_marker(out: &mut String, marker: &str, label: &str) {
    out.push_str(marker);
    if !label.is_empty() {
        out.push(' ');
        out.push_str(label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conflict::parser::parse_conflicts;

    #[test]
    fn test_scenario_b_mid_line_yaml_value() {
        // Markers always start a line; the `foo: ` prefix repeats on both sides.
        let out = create_conflict("foo: bar\n", "bar", "baz");
        assert_eq!(
            out,
            "<<<<<<< Current\nfoo: bar\n=======\nfoo: baz\n>>>>>>> AI suggestion\n"
        );
    }

    #[test]
    fn test_not_found_is_noop() {
        let doc = "{\n  \"a\": 1\n}\n";
        assert_eq!(create_conflict(doc, "missing", "x"), doc);
        assert_eq!(create_conflict(doc, "", "x"), doc);
    }

    #[test]
    fn test_first_occurrence_only() {
        let doc = "a: 1\nb: 1\n";
        let out = create_conflict(doc, "1", "2");
        let conflicts = parse_conflicts(&out);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].current, vec!["a: 1"]);
        assert_eq!(conflicts[0].incoming, vec!["a: 2"]);
        assert!(out.ends_with(">>>>>>> AI suggestion\nb: 1\n"));
    }

    #[test]
    fn test_mid_line_match_keeps_whole_line() {
        let doc = "head\n    \"content\": \"hello\",\ntail";
        let out = create_conflict(doc, "\"hello\"", "\"hi\"");
        assert!(out.starts_with("head\n<<<<<<< Current\n"));
        assert!(out.ends_with(">>>>>>> AI suggestion\ntail"));
        let c = &parse_conflicts(&out)[0];
        assert_eq!(c.current, vec!["    \"content\": \"hello\","]);
        assert_eq!(c.incoming, vec!["    \"content\": \"hi\","]);
    }

    #[test]
    fn test_multiline_suggestion() {
        let doc = "x\nline one\nline two\ny\n";
        let out = create_conflict(doc, "line one\nline two", "only line");
        let c = &parse_conflicts(&out)[0];
        assert_eq!(c.current, vec!["line one", "line two"]);
        assert_eq!(c.incoming, vec!["only line"]);
    }

    #[test]
    fn test_sequential_calls_compose() {
        let doc = "a: 1\nb: 2\n";
        let once = create_conflict(doc, "a: 1", "a: 10");
        let twice = create_conflict(&once, "b: 2", "b: 20");
        let conflicts = parse_conflicts(&twice);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].incoming, vec!["a: 10"]);
        assert_eq!(conflicts[1].incoming, vec!["b: 20"]);
    }

    #[test]
    fn test_custom_labels() {
        let labels = ConflictLabels {
            current: String::new(),
            incoming: "assistant".into(),
        };
        let out = create_conflict_with_labels("k\n", "k", "v", &labels);
        assert_eq!(out, "<<<<<<<\nk\n=======\nv\n>>>>>>> assistant\n");
    }
}
