//! Conflict marker parsing.
//!
//! Scans a merge buffer for `<<<<<<<` / `=======` / `>>>>>>>` regions and
//! extracts one [`Conflict`] per well-formed region, in document order.
//! Parsing is lenient: unterminated or nested regions are dropped without
//! error, since the buffer is regenerated and re-parsed after every edit.

use serde::{Deserialize, Serialize};
use tracing::trace;

/// Line prefix opening a conflict region (the "current" side follows).
pub const START: &str = "<<<<<<<";
/// Line prefix separating the current side from the incoming side.
pub const MIDDLE: &str = "=======";
/// Line prefix closing a conflict region.
pub const END: &str = ">>>>>>>";

/// Which half of a conflict the scanner was filling when it stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Marker {
    /// Between the start marker and the separator.
    Start,
    /// Between the separator and the end marker.
    Middle,
}

/// One parsed conflict region. Line numbers are 0-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conflict {
    /// Scan state when the region was closed. Always [`Marker::Middle`] for
    /// emitted conflicts.
    pub marker: Marker,
    /// Lines of the current (local) side.
    pub current: Vec<String>,
    /// Lines of the incoming (AI-suggested) side.
    pub incoming: Vec<String>,
    pub start_line: usize,
    /// Line of the start marker. Same as `start_line`.
    pub header_line: usize,
    /// Line of the separator marker.
    pub separator_line: usize,
    /// Line of the end marker. Same as `end_line`.
    pub footer_line: usize,
    pub end_line: usize,
    /// Whether the line right above the header is blank (whitespace only).
    pub has_blank_line_before: bool,
}

impl Conflict {
    /// Number of buffer lines spanned by the region, markers included.
    pub fn line_span(&self) -> usize {
        self.footer_line - self.header_line + 1
    }
}

/// Accumulator for the region currently being scanned.
struct OpenConflict {
    marker: Marker,
    current: Vec<String>,
    incoming: Vec<String>,
    header_line: usize,
    separator_line: usize,
    has_blank_line_before: bool,
}

/// Parse every well-formed conflict region in `text`.
pub fn parse_conflicts(text: &str) -> Vec<Conflict> {
    let lines: Vec<&str> = text.split('\n').collect();
    let mut conflicts = Vec::new();
    let mut open: Option<OpenConflict> = None;

    for (index, line) in lines.iter().enumerate() {
        if line.starts_with(START) {
            if open.is_some() {
                trace!(line = index, "discarding unterminated conflict");
            }
            open = Some(OpenConflict {
                marker: Marker::Start,
                current: Vec::new(),
                incoming: Vec::new(),
                header_line: index,
                separator_line: index,
                has_blank_line_before: index > 0 && lines[index - 1].trim().is_empty(),
            });
            continue;
        }

        let Some(acc) = open.as_mut() else {
            continue;
        };

        if line.starts_with(MIDDLE) {
            acc.marker = Marker::Middle;
            acc.separator_line = index;
        } else if line.starts_with(END) {
            if let Some(acc) = open.take() {
                if acc.marker == Marker::Middle {
                    conflicts.push(Conflict {
                        marker: acc.marker,
                        current: acc.current,
                        incoming: acc.incoming,
                        start_line: acc.header_line,
                        header_line: acc.header_line,
                        separator_line: acc.separator_line,
                        footer_line: index,
                        end_line: index,
                        has_blank_line_before: acc.has_blank_line_before,
                    });
                } else {
                    trace!(line = index, "dropping conflict without separator");
                }
            }
        } else {
            match acc.marker {
                Marker::Start => acc.current.push((*line).to_string()),
                Marker::Middle => acc.incoming.push((*line).to_string()),
            }
        }
    }

    conflicts
}

/// Whether `text` contains at least one well-formed conflict region.
pub fn has_conflicts(text: &str) -> bool {
    !parse_conflicts(text).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_markers() {
        assert!(parse_conflicts("").is_empty());
        assert!(parse_conflicts("{\n  \"a\": 1\n}\n").is_empty());
    }

    #[test]
    fn test_single_conflict() {
        let conflicts = parse_conflicts("a\n<<<<<<<\nX\n=======\nY\n>>>>>>>\nb");
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!(c.current, vec!["X"]);
        assert_eq!(c.incoming, vec!["Y"]);
        assert_eq!(c.header_line, 1);
        assert_eq!(c.start_line, 1);
        assert_eq!(c.separator_line, 3);
        assert_eq!(c.footer_line, 5);
        assert_eq!(c.end_line, 5);
        assert_eq!(c.marker, Marker::Middle);
        assert!(!c.has_blank_line_before);
        assert_eq!(c.line_span(), 5);
    }

    #[test]
    fn test_labels_are_ignored() {
        let text = "<<<<<<< Current\nold\n======= \nnew\n>>>>>>> AI suggestion";
        let conflicts = parse_conflicts(text);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].current, vec!["old"]);
        assert_eq!(conflicts[0].incoming, vec!["new"]);
    }

    #[test]
    fn test_blank_line_before() {
        let conflicts = parse_conflicts("a\n  \n<<<<<<<\nX\n=======\nY\n>>>>>>>");
        assert!(conflicts[0].has_blank_line_before);

        // The first line never counts as preceded by a blank line.
        let conflicts = parse_conflicts("<<<<<<<\nX\n=======\nY\n>>>>>>>");
        assert!(!conflicts[0].has_blank_line_before);
    }

    #[test]
    fn test_multiple_conflicts_in_order() {
        let text = "<<<<<<<\na\n=======\nb\n>>>>>>>\nmid\n<<<<<<<\nc\nd\n=======\n>>>>>>>";
        let conflicts = parse_conflicts(text);
        assert_eq!(conflicts.len(), 2);
        assert_eq!(conflicts[0].header_line, 0);
        assert_eq!(conflicts[1].header_line, 6);
        assert_eq!(conflicts[1].current, vec!["c", "d"]);
        assert!(conflicts[1].incoming.is_empty());
    }

    #[test]
    fn test_nested_start_discards_previous() {
        let text = "<<<<<<<\nlost\n<<<<<<<\nX\n=======\nY\n>>>>>>>";
        let conflicts = parse_conflicts(text);
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].header_line, 2);
        assert_eq!(conflicts[0].current, vec!["X"]);
    }

    #[test]
    fn test_unterminated_is_dropped() {
        assert!(parse_conflicts("<<<<<<<\nX\n=======\nY").is_empty());
        assert!(parse_conflicts("<<<<<<<\nX\n>>>>>>>").is_empty());
    }

    #[test]
    fn test_stray_markers_outside_region() {
        let text = "=======\n>>>>>>>\nplain";
        assert!(parse_conflicts(text).is_empty());
        assert!(!has_conflicts(text));
    }

    #[test]
    fn test_side_lengths_match_line_numbers() {
        let text = "x\n<<<<<<<\n1\n2\n3\n=======\n4\n>>>>>>>\n";
        let c = &parse_conflicts(text)[0];
        assert_eq!(c.current.len(), c.separator_line - c.header_line - 1);
        assert_eq!(c.incoming.len(), c.footer_line - c.separator_line - 1);
    }
}
