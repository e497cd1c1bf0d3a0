use respdiff_common::{ComparisonMetrics, DiffResult, NormalizedDocument};

/// Derive summary statistics for one comparison.
///
/// Lengths are counted on the normalized documents (tree nodes or text
/// lines), never on raw bytes.
pub fn compute(
    left: &NormalizedDocument,
    right: &NormalizedDocument,
    diff: &DiffResult,
) -> ComparisonMetrics {
    ComparisonMetrics {
        left_length: left.length(),
        right_length: right.length(),
        diff_count: diff.diff_count(),
        normalized: left.altered() || right.altered(),
        formats_matched: left.format() == right.format(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::differ::Differ;
    use crate::normalizer::Normalizer;
    use respdiff_common::ContentFormat;

    fn normalize(format: ContentFormat, body: &str) -> NormalizedDocument {
        Normalizer::new().normalize(format, body.as_bytes()).unwrap()
    }

    #[test]
    fn test_text_metrics() {
        let left = normalize(ContentFormat::Text, "line1\nline2");
        let right = normalize(ContentFormat::Text, "line1\nline3\nline4");
        let diff = Differ::new().diff(&left, &right);

        let metrics = compute(&left, &right, &diff);
        assert_eq!(metrics.left_length, 2);
        assert_eq!(metrics.right_length, 3);
        assert_eq!(metrics.diff_count, 2);
        assert!(!metrics.normalized);
        assert!(metrics.formats_matched);
    }

    #[test]
    fn test_tree_lengths_count_nodes() {
        let left = normalize(ContentFormat::Json, r#"{"a":1,"b":[1,2]}"#);
        let right = normalize(ContentFormat::Json, r#"{"a":1}"#);
        let diff = Differ::new().diff(&left, &right);

        let metrics = compute(&left, &right, &diff);
        assert_eq!(metrics.left_length, 5);
        assert_eq!(metrics.right_length, 2);
        assert_eq!(metrics.diff_count, 1);
    }

    #[test]
    fn test_whitespace_does_not_skew_length() {
        let compact = normalize(ContentFormat::Json, r#"{"a":1}"#);
        let spaced = normalize(ContentFormat::Json, "{\n    \"a\" :   1\n}\n");
        let diff = Differ::new().diff(&compact, &spaced);

        let metrics = compute(&compact, &spaced, &diff);
        assert_eq!(metrics.left_length, metrics.right_length);
        assert_eq!(metrics.diff_count, 0);
        assert!(metrics.normalized);
    }

    #[test]
    fn test_format_mismatch() {
        let left = normalize(ContentFormat::Json, r#"{"a":"1"}"#);
        let right = normalize(ContentFormat::Xml, "<a>1</a>");
        let diff = Differ::new().diff(&left, &right);

        let metrics = compute(&left, &right, &diff);
        assert!(!metrics.formats_matched);
        assert_eq!(metrics.diff_count, 1);
    }
}
