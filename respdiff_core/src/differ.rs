use respdiff_common::{DiffEntry, DiffResult, Node, NodeKind, NodeValue, NormalizedDocument};
use similar::{capture_diff_slices, Algorithm, DiffOp};
use std::collections::HashMap;
use std::hash::Hash;
use tracing::debug;

/// Computes ordered diffs between two normalized documents
#[derive(Debug, Clone, Copy)]
pub struct Differ {
    algorithm: Algorithm,
}

impl Differ {
    pub fn new() -> Self {
        Self {
            algorithm: Algorithm::Myers,
        }
    }

    /// Use a different sequence alignment algorithm.
    ///
    /// Myers (the default) yields a minimal edit script; Patience tends to
    /// read better on code-like text but is not minimal.
    pub fn with_algorithm(mut self, algorithm: Algorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn diff(&self, left: &NormalizedDocument, right: &NormalizedDocument) -> DiffResult {
        let entries = match (left, right) {
            (
                NormalizedDocument::Text { lines: left_lines, .. },
                NormalizedDocument::Text { lines: right_lines, .. },
            ) => self.diff_lines(left_lines, right_lines),
            (
                NormalizedDocument::Json { root: left_root, .. },
                NormalizedDocument::Json { root: right_root, .. },
            )
            | (
                NormalizedDocument::Xml { root: left_root, .. },
                NormalizedDocument::Xml { root: right_root, .. },
            ) => {
                let mut walker = TreeWalker {
                    algorithm: self.algorithm,
                    entries: Vec::new(),
                };
                walker.diff_node(left_root, right_root, 0, 0, "$".to_string());
                walker.entries
            }
            _ => {
                debug!(
                    "Format mismatch ({} vs {}), reporting whole-document replacement",
                    left.format(),
                    right.format()
                );
                vec![DiffEntry::replace(
                    0,
                    left.canonical_text(),
                    right.canonical_text(),
                )]
            }
        };

        let result = DiffResult::new(entries);
        debug!(
            "Diff produced {} entries ({} changes)",
            result.len(),
            result.diff_count()
        );
        result
    }

    /// Line-level diff of two text documents
    pub fn diff_lines(&self, left: &[String], right: &[String]) -> Vec<DiffEntry> {
        let mut entries = Vec::new();
        for op in align(self.algorithm, left, right) {
            match op {
                DiffOp::Equal {
                    old_index,
                    new_index,
                    len,
                } => {
                    for k in 0..len {
                        entries.push(DiffEntry::equal(
                            old_index + k,
                            left[old_index + k].as_str(),
                            right[new_index + k].as_str(),
                        ));
                    }
                }
                DiffOp::Delete {
                    old_index, old_len, ..
                } => {
                    for k in old_index..old_index + old_len {
                        entries.push(DiffEntry::delete(k, left[k].as_str()));
                    }
                }
                DiffOp::Insert {
                    new_index, new_len, ..
                } => {
                    for k in new_index..new_index + new_len {
                        entries.push(DiffEntry::insert(k, right[k].as_str()));
                    }
                }
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    let paired = old_len.min(new_len);
                    for k in 0..paired {
                        entries.push(DiffEntry::replace(
                            old_index + k,
                            left[old_index + k].as_str(),
                            right[new_index + k].as_str(),
                        ));
                    }
                    for k in old_index + paired..old_index + old_len {
                        entries.push(DiffEntry::delete(k, left[k].as_str()));
                    }
                    for k in new_index + paired..new_index + new_len {
                        entries.push(DiffEntry::insert(k, right[k].as_str()));
                    }
                }
            }
        }
        entries
    }
}

impl Default for Differ {
    fn default() -> Self {
        Self::new()
    }
}

/// Align two sequences; adjacent delete+insert runs come back as `Replace`
fn align<T: Hash + Eq + Ord>(algorithm: Algorithm, left: &[T], right: &[T]) -> Vec<DiffOp> {
    capture_diff_slices(algorithm, left, right)
}

/// Pre-order index of each child, given the index of its parent
fn child_positions(parent: usize, children: &[Node]) -> Vec<usize> {
    let mut next = parent + 1;
    children
        .iter()
        .map(|child| {
            let position = next;
            next += child.node_count();
            position
        })
        .collect()
}

struct TreeWalker {
    algorithm: Algorithm,
    entries: Vec<DiffEntry>,
}

impl TreeWalker {
    fn diff_node(&mut self, left: &Node, right: &Node, left_pos: usize, right_pos: usize, path: String) {
        let left_canonical = left.canonical();
        let right_canonical = right.canonical();

        if left_canonical == right_canonical {
            self.entries
                .push(DiffEntry::equal(left_pos, left_canonical, right_canonical).at_path(path));
            return;
        }

        match (&left.value, &right.value) {
            (NodeValue::Object(left_fields), NodeValue::Object(right_fields)) => {
                self.diff_object(left_fields, right_fields, left_pos, right_pos, &path);
            }
            (NodeValue::Array(left_items), NodeValue::Array(right_items)) => {
                self.diff_array(left_items, right_items, left_pos, right_pos, &path);
            }
            _ => {
                self.entries
                    .push(DiffEntry::replace(left_pos, left_canonical, right_canonical).at_path(path));
            }
        }
    }

    /// Objects are matched by field name, so field order never matters
    fn diff_object(
        &mut self,
        left: &[Node],
        right: &[Node],
        left_pos: usize,
        right_pos: usize,
        path: &str,
    ) {
        let left_positions = child_positions(left_pos, left);
        let right_positions = child_positions(right_pos, right);

        let right_by_name: HashMap<&str, usize> = right
            .iter()
            .enumerate()
            .filter_map(|(i, node)| node.field_name().map(|name| (name, i)))
            .collect();

        for (i, left_child) in left.iter().enumerate() {
            let child_path = left_child.path_under(path);
            let matched = left_child
                .field_name()
                .and_then(|name| right_by_name.get(name).copied());

            match matched {
                Some(j) => self.diff_node(
                    left_child,
                    &right[j],
                    left_positions[i],
                    right_positions[j],
                    child_path,
                ),
                None => self.entries.push(
                    DiffEntry::delete(left_positions[i], left_child.canonical()).at_path(child_path),
                ),
            }
        }

        for (j, right_child) in right.iter().enumerate() {
            let present_left = right_child
                .field_name()
                .map(|name| left.iter().any(|l| l.field_name() == Some(name)))
                .unwrap_or(false);
            if !present_left {
                self.entries.push(
                    DiffEntry::insert(right_positions[j], right_child.canonical())
                        .at_path(right_child.path_under(path)),
                );
            }
        }
    }

    /// Array items are aligned as a sequence of canonical strings so that an
    /// insertion does not mark every following item as changed
    fn diff_array(
        &mut self,
        left: &[Node],
        right: &[Node],
        left_pos: usize,
        right_pos: usize,
        path: &str,
    ) {
        let left_positions = child_positions(left_pos, left);
        let right_positions = child_positions(right_pos, right);
        let left_keys: Vec<String> = left.iter().map(Node::canonical).collect();
        let right_keys: Vec<String> = right.iter().map(Node::canonical).collect();

        for op in align(self.algorithm, &left_keys, &right_keys) {
            match op {
                DiffOp::Equal {
                    old_index,
                    new_index,
                    len,
                } => {
                    for k in 0..len {
                        let (i, j) = (old_index + k, new_index + k);
                        self.entries.push(
                            DiffEntry::equal(left_positions[i], left_keys[i].as_str(), right_keys[j].as_str())
                                .at_path(left[i].path_under(path)),
                        );
                    }
                }
                DiffOp::Delete {
                    old_index, old_len, ..
                } => {
                    for i in old_index..old_index + old_len {
                        self.push_delete(left, &left_positions, &left_keys, i, path);
                    }
                }
                DiffOp::Insert {
                    new_index, new_len, ..
                } => {
                    for j in new_index..new_index + new_len {
                        self.push_insert(right, &right_positions, &right_keys, j, path);
                    }
                }
                DiffOp::Replace {
                    old_index,
                    old_len,
                    new_index,
                    new_len,
                } => {
                    let paired = old_len.min(new_len);
                    for k in 0..paired {
                        let (i, j) = (old_index + k, new_index + k);
                        let (l, r) = (&left[i], &right[j]);
                        if l.kind() != NodeKind::Scalar && l.kind() == r.kind() {
                            self.diff_node(l, r, left_positions[i], right_positions[j], l.path_under(path));
                        } else {
                            self.entries.push(
                                DiffEntry::replace(
                                    left_positions[i],
                                    left_keys[i].as_str(),
                                    right_keys[j].as_str(),
                                )
                                .at_path(l.path_under(path)),
                            );
                        }
                    }
                    for i in old_index + paired..old_index + old_len {
                        self.push_delete(left, &left_positions, &left_keys, i, path);
                    }
                    for j in new_index + paired..new_index + new_len {
                        self.push_insert(right, &right_positions, &right_keys, j, path);
                    }
                }
            }
        }
    }

    fn push_delete(&mut self, items: &[Node], positions: &[usize], keys: &[String], i: usize, path: &str) {
        self.entries
            .push(DiffEntry::delete(positions[i], keys[i].as_str()).at_path(items[i].path_under(path)));
    }

    fn push_insert(&mut self, items: &[Node], positions: &[usize], keys: &[String], j: usize, path: &str) {
        self.entries
            .push(DiffEntry::insert(positions[j], keys[j].as_str()).at_path(items[j].path_under(path)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::Normalizer;
    use respdiff_common::{ContentFormat, DiffOp as EntryOp};

    fn doc(format: ContentFormat, body: &str) -> NormalizedDocument {
        Normalizer::new().normalize(format, body.as_bytes()).unwrap()
    }

    fn changes(result: &DiffResult) -> Vec<&DiffEntry> {
        result.iter().filter(|e| e.is_change()).collect()
    }

    #[test]
    fn test_identical_documents_are_all_equal() {
        for (format, body) in [
            (ContentFormat::Json, r#"{"a": [1, {"b": null}], "c": "x"}"#),
            (ContentFormat::Xml, r#"<a x="1"><b>t</b><b/></a>"#),
            (ContentFormat::Text, "one\ntwo\n\nthree"),
        ] {
            let d = doc(format, body);
            let result = Differ::new().diff(&d, &d);
            assert!(!result.is_empty());
            assert!(result.iter().all(|e| e.op == EntryOp::Equal));
            assert_eq!(result.diff_count(), 0);
        }
    }

    #[test]
    fn test_text_single_replace() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Text, "line1\nline2"),
            &doc(ContentFormat::Text, "line1\nline3"),
        );

        assert_eq!(result.diff_count(), 1);
        let change = changes(&result)[0];
        assert_eq!(change.op, EntryOp::Replace);
        assert_eq!(change.position, 1);
        assert_eq!(change.left_fragment.as_deref(), Some("line2"));
        assert_eq!(change.right_fragment.as_deref(), Some("line3"));
    }

    #[test]
    fn test_text_insert_and_delete() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Text, "a\nb\nc"),
            &doc(ContentFormat::Text, "a\nc\nd"),
        );

        let ops: Vec<_> = result.iter().map(|e| (e.op, e.position)).collect();
        assert_eq!(
            ops,
            vec![
                (EntryOp::Equal, 0),
                (EntryOp::Delete, 1),
                (EntryOp::Equal, 2),
                (EntryOp::Insert, 2),
            ]
        );
    }

    #[test]
    fn test_text_uneven_replace_block() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Text, "keep\nold1\nold2\nend"),
            &doc(ContentFormat::Text, "keep\nnew1\nend"),
        );

        let stats = result.stats();
        assert_eq!(stats.replace, 1);
        assert_eq!(stats.delete, 1);
        assert_eq!(stats.insert, 0);
        assert_eq!(stats.equal, 2);
    }

    #[test]
    fn test_json_key_order_is_ignored() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Json, r#"{"a":1,"b":2}"#),
            &doc(ContentFormat::Json, r#"{"b":2,"a":1}"#),
        );
        assert_eq!(result.diff_count(), 0);
    }

    #[test]
    fn test_json_nested_value_change() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Json, r#"{"user": {"name": "alice", "age": 30}, "ok": true}"#),
            &doc(ContentFormat::Json, r#"{"ok": true, "user": {"age": 31, "name": "alice"}}"#),
        );

        let changed = changes(&result);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].op, EntryOp::Replace);
        assert_eq!(changed[0].path.as_deref(), Some("$.user.age"));
        assert_eq!(changed[0].left_fragment.as_deref(), Some("30"));
        assert_eq!(changed[0].right_fragment.as_deref(), Some("31"));
        // root(0) user(1) name(2) age(3)
        assert_eq!(changed[0].position, 3);
    }

    #[test]
    fn test_json_added_and_removed_keys() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Json, r#"{"keep": 1, "gone": 2}"#),
            &doc(ContentFormat::Json, r#"{"keep": 1, "new": {"x": 1}}"#),
        );

        let changed = changes(&result);
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0].op, EntryOp::Delete);
        assert_eq!(changed[0].path.as_deref(), Some("$.gone"));
        assert_eq!(changed[1].op, EntryOp::Insert);
        assert_eq!(changed[1].path.as_deref(), Some("$.new"));
        assert_eq!(changed[1].right_fragment.as_deref(), Some(r#"{"x":1}"#));
        assert_eq!(changed[1].position, 2);
    }

    #[test]
    fn test_json_array_insertion_does_not_shift_items() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Json, r#"{"items": [1, 2, 3, 4]}"#),
            &doc(ContentFormat::Json, r#"{"items": [1, 9, 2, 3, 4]}"#),
        );

        let changed = changes(&result);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].op, EntryOp::Insert);
        assert_eq!(changed[0].path.as_deref(), Some("$.items[1]"));
        assert_eq!(changed[0].right_fragment.as_deref(), Some("9"));
    }

    #[test]
    fn test_json_array_item_recurses_into_objects() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Json, r#"[{"id": 1, "name": "a"}, {"id": 2, "name": "b"}]"#),
            &doc(ContentFormat::Json, r#"[{"id": 1, "name": "a"}, {"id": 2, "name": "c"}]"#),
        );

        let changed = changes(&result);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].path.as_deref(), Some("$[1].name"));
    }

    #[test]
    fn test_json_integers_beyond_u64_stay_distinct() {
        let left = doc(ContentFormat::Json, r#"{"id":18446744073709551616}"#);
        let right = doc(ContentFormat::Json, r#"{"id":18446744073709551617}"#);
        assert_eq!(left.tree().unwrap().canonical(), r#"{"id":18446744073709551616}"#);
        assert!(!left.altered());

        let result = Differ::new().diff(&left, &right);
        let changed = changes(&result);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].path.as_deref(), Some("$.id"));
        assert_eq!(changed[0].right_fragment.as_deref(), Some("18446744073709551617"));
    }

    #[test]
    fn test_json_type_change_is_replace() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Json, r#"{"v": [1]}"#),
            &doc(ContentFormat::Json, r#"{"v": "1"}"#),
        );
        let changed = changes(&result);
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].op, EntryOp::Replace);
        assert_eq!(changed[0].left_fragment.as_deref(), Some("[1]"));
        assert_eq!(changed[0].right_fragment.as_deref(), Some("\"1\""));
    }

    #[test]
    fn test_xml_attribute_order_is_ignored() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Xml, r#"<r><i a="1" b="2"/></r>"#),
            &doc(ContentFormat::Xml, r#"<r><i b="2" a="1"/></r>"#),
        );
        assert_eq!(result.diff_count(), 0);
    }

    #[test]
    fn test_xml_element_order_matters() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Xml, "<r><a>1</a><b>2</b></r>"),
            &doc(ContentFormat::Xml, "<r><b>2</b><a>1</a></r>"),
        );
        assert!(result.diff_count() > 0);
    }

    #[test]
    fn test_xml_text_moved_across_child_is_a_difference() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Xml, "<a>foo<b/>bar</a>"),
            &doc(ContentFormat::Xml, "<a>foob<b/>ar</a>"),
        );

        let changed = changes(&result);
        assert_eq!(changed.len(), 2);
        assert_eq!(changed[0].path.as_deref(), Some("$.#children[0]"));
        assert_eq!(changed[0].left_fragment.as_deref(), Some("\"foo\""));
        assert_eq!(changed[1].path.as_deref(), Some("$.#children[2]"));
        assert_eq!(changed[1].right_fragment.as_deref(), Some("\"ar\""));
    }

    #[test]
    fn test_format_mismatch_is_whole_document_replace() {
        let result = Differ::new().diff(
            &doc(ContentFormat::Json, r#"{"a": 1}"#),
            &doc(ContentFormat::Xml, "<a>1</a>"),
        );

        assert_eq!(result.len(), 1);
        assert!(result.iter().all(|e| e.op == EntryOp::Replace && e.position == 0));
        assert_eq!(result.diff_count(), 1);
    }

    #[test]
    fn test_patience_algorithm() {
        let differ = Differ::new().with_algorithm(Algorithm::Patience);
        let result = differ.diff(
            &doc(ContentFormat::Text, "fn main() {\n    println!(\"Hello\");\n}"),
            &doc(ContentFormat::Text, "fn main() {\n    println!(\"World\");\n}"),
        );
        assert_eq!(result.diff_count(), 1);
    }
}
