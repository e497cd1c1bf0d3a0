//! Unified and split presentations of a `DiffResult`.
//!
//! Both views are pure transforms of the same ordered entry sequence.

use respdiff_common::{DiffEntry, DiffOp, DiffResult};
use serde::Serialize;
use similar::{ChangeTag, TextDiff};

/// Marker of a unified diff line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMarker {
    Context,
    Added,
    Removed,
}

impl LineMarker {
    pub fn symbol(&self) -> char {
        match self {
            LineMarker::Context => ' ',
            LineMarker::Added => '+',
            LineMarker::Removed => '-',
        }
    }
}

/// One line of the unified view
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnifiedLine {
    pub marker: LineMarker,
    pub text: String,
}

impl std::fmt::Display for UnifiedLine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}", self.marker.symbol(), self.text)
    }
}

/// One row of the side-by-side view; `None` is a blank cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitRow {
    pub op: DiffOp,
    pub left: Option<String>,
    pub right: Option<String>,
}

/// Display text of one side of an entry, prefixed with its tree path
fn fragment_lines(entry: &DiffEntry, fragment: Option<&String>) -> Vec<String> {
    let Some(fragment) = fragment else {
        return Vec::new();
    };
    let mut lines: Vec<String> = fragment.split('\n').map(str::to_string).collect();
    if let (Some(path), Some(first)) = (&entry.path, lines.first_mut()) {
        *first = format!("{}: {}", path, first);
    }
    lines
}

/// Interleave the entries into a single stream of `+`/`-`/` ` lines.
///
/// A replace renders its left side as removed lines followed by its right
/// side as added lines.
pub fn render_unified(result: &DiffResult) -> Vec<UnifiedLine> {
    let mut lines = Vec::new();
    for entry in result.iter() {
        let mut push = |marker: LineMarker, fragment: Option<&String>| {
            lines.extend(
                fragment_lines(entry, fragment)
                    .into_iter()
                    .map(|text| UnifiedLine { marker, text }),
            );
        };

        match entry.op {
            DiffOp::Equal => push(LineMarker::Context, entry.left_fragment.as_ref()),
            DiffOp::Delete => push(LineMarker::Removed, entry.left_fragment.as_ref()),
            DiffOp::Insert => push(LineMarker::Added, entry.right_fragment.as_ref()),
            DiffOp::Replace => {
                push(LineMarker::Removed, entry.left_fragment.as_ref());
                push(LineMarker::Added, entry.right_fragment.as_ref());
            }
        }
    }
    lines
}

/// Lay the entries out as two columns, blank-filling the shorter side
pub fn render_split(result: &DiffResult) -> Vec<SplitRow> {
    let mut rows = Vec::new();
    for entry in result.iter() {
        let left = fragment_lines(entry, entry.left_fragment.as_ref());
        let right = fragment_lines(entry, entry.right_fragment.as_ref());
        let height = left.len().max(right.len());

        let mut left = left.into_iter();
        let mut right = right.into_iter();
        for _ in 0..height {
            rows.push(SplitRow {
                op: entry.op,
                left: left.next(),
                right: right.next(),
            });
        }
    }
    rows
}

/// Plain-text unified diff, one line per entry line
pub fn format_unified(result: &DiffResult) -> String {
    render_unified(result)
        .iter()
        .map(UnifiedLine::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Plain-text side-by-side diff with fixed-width columns
pub fn format_split(result: &DiffResult, column_width: usize) -> String {
    render_split(result)
        .iter()
        .map(|row| {
            let status = match row.op {
                DiffOp::Equal => "  ",
                DiffOp::Insert => " >",
                DiffOp::Delete => "< ",
                DiffOp::Replace => "<>",
            };
            format!(
                "{:<width$} {} {}",
                truncate(row.left.as_deref().unwrap_or(""), column_width),
                status,
                truncate(row.right.as_deref().unwrap_or(""), column_width),
                width = column_width
            )
            .trim_end()
            .to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// First `max_chars` characters of the unified diff
pub fn diff_summary(result: &DiffResult, max_chars: usize) -> String {
    format_unified(result).chars().take(max_chars).collect()
}

/// A run of characters within one side of a replaced line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineSegment {
    pub text: String,
    pub changed: bool,
}

/// Character-level changes between the two sides of a replaced line.
///
/// Returns the left line split into kept and removed runs, and the right
/// line split into kept and inserted runs.
pub fn inline_changes(left: &str, right: &str) -> (Vec<InlineSegment>, Vec<InlineSegment>) {
    let diff = TextDiff::from_chars(left, right);
    let mut left_segments = Vec::new();
    let mut right_segments = Vec::new();

    for change in diff.iter_all_changes() {
        let (on_left, on_right) = match change.tag() {
            ChangeTag::Equal => (true, true),
            ChangeTag::Delete => (true, false),
            ChangeTag::Insert => (false, true),
        };
        let changed = change.tag() != ChangeTag::Equal;
        if on_left {
            push_segment(&mut left_segments, change.value(), changed);
        }
        if on_right {
            push_segment(&mut right_segments, change.value(), changed);
        }
    }

    (left_segments, right_segments)
}

fn push_segment(segments: &mut Vec<InlineSegment>, text: &str, changed: bool) {
    match segments.last_mut() {
        Some(last) if last.changed == changed => last.text.push_str(text),
        _ => segments.push(InlineSegment {
            text: text.to_string(),
            changed,
        }),
    }
}

/// Shorten `text` to at most `max_len` characters, ending in `...` when cut
pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let keep = max_len.saturating_sub(3);
    format!("{}...", text.chars().take(keep).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> DiffResult {
        DiffResult::new(vec![
            DiffEntry::equal(0, "line1", "line1"),
            DiffEntry::replace(1, "line2", "line3"),
            DiffEntry::insert(2, "line4"),
        ])
    }

    #[test]
    fn test_unified_markers() {
        let lines: Vec<String> = render_unified(&sample()).iter().map(|l| l.to_string()).collect();
        assert_eq!(lines, vec![" line1", "-line2", "+line3", "+line4"]);
    }

    #[test]
    fn test_split_blank_fills() {
        let rows = render_split(&sample());
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].left.as_deref(), Some("line2"));
        assert_eq!(rows[1].right.as_deref(), Some("line3"));
        assert_eq!(rows[2].left, None);
        assert_eq!(rows[2].right.as_deref(), Some("line4"));
    }

    #[test]
    fn test_multiline_fragments_expand() {
        let result = DiffResult::new(vec![DiffEntry::replace(0, "{\n  \"a\": 1\n}", "<a>1</a>")]);

        let rows = render_split(&result);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].right.as_deref(), Some("<a>1</a>"));
        assert!(rows[1].right.is_none() && rows[2].right.is_none());

        let unified = render_unified(&result);
        assert_eq!(unified.len(), 4);
        assert_eq!(unified[3].marker, LineMarker::Added);
    }

    #[test]
    fn test_tree_paths_prefix_fragments() {
        let result = DiffResult::new(vec![DiffEntry::replace(3, "30", "31").at_path("$.user.age")]);
        assert_eq!(format_unified(&result), "-$.user.age: 30\n+$.user.age: 31");
    }

    #[test]
    fn test_format_split_columns() {
        let text = format_split(&sample(), 8);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "line1       line1");
        assert_eq!(lines[1], "line2    <> line3");
        assert_eq!(lines[2], "          > line4");
    }

    #[test]
    fn test_truncate_counts_characters() {
        assert_eq!(truncate("short", 8), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
        assert_eq!(truncate("ééééééééé", 5), "éé...");
    }

    #[test]
    fn test_diff_summary_truncates() {
        assert_eq!(diff_summary(&sample(), 7), " line1\n");
    }

    #[test]
    fn test_inline_changes() {
        let (left, right) = inline_changes("age: 30", "age: 31");

        let joined = |segments: &[InlineSegment]| -> String {
            segments.iter().map(|s| s.text.as_str()).collect()
        };
        assert_eq!(joined(&left), "age: 30");
        assert_eq!(joined(&right), "age: 31");

        assert_eq!(left[0], InlineSegment { text: "age: 3".into(), changed: false });
        assert_eq!(left[1], InlineSegment { text: "0".into(), changed: true });
        assert_eq!(right[1], InlineSegment { text: "1".into(), changed: true });
    }
}
