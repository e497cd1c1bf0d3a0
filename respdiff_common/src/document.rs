use crate::ContentFormat;
use serde::{Deserialize, Serialize};

/// How a node is addressed inside its parent
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKey {
    Root,
    Field(String),
    Index(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Scalar,
    Object,
    Array,
}

/// Payload of a tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeValue {
    /// Canonical literal text of a leaf (`"text"`, `42`, `true`, `null`)
    Scalar(String),
    /// Keyed children in the order they were encountered
    Object(Vec<Node>),
    /// Positional children
    Array(Vec<Node>),
}

/// One node of a normalized JSON or XML tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub key: NodeKey,
    pub value: NodeValue,
}

impl Node {
    pub fn scalar(key: NodeKey, literal: impl Into<String>) -> Self {
        Self {
            key,
            value: NodeValue::Scalar(literal.into()),
        }
    }

    pub fn object(key: NodeKey, children: Vec<Node>) -> Self {
        Self {
            key,
            value: NodeValue::Object(children),
        }
    }

    pub fn array(key: NodeKey, children: Vec<Node>) -> Self {
        Self {
            key,
            value: NodeValue::Array(children),
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.value {
            NodeValue::Scalar(_) => NodeKind::Scalar,
            NodeValue::Object(_) => NodeKind::Object,
            NodeValue::Array(_) => NodeKind::Array,
        }
    }

    pub fn children(&self) -> &[Node] {
        match &self.value {
            NodeValue::Scalar(_) => &[],
            NodeValue::Object(children) | NodeValue::Array(children) => children,
        }
    }

    /// Number of nodes in this subtree, including itself
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(Node::node_count).sum::<usize>()
    }

    /// Field name of this node when it lives in an object
    pub fn field_name(&self) -> Option<&str> {
        match &self.key {
            NodeKey::Field(name) => Some(name),
            _ => None,
        }
    }

    /// Path of this node given the path of its parent (`$` for the root)
    pub fn path_under(&self, parent: &str) -> String {
        match &self.key {
            NodeKey::Root => "$".to_string(),
            NodeKey::Field(name) => format!("{}.{}", parent, name),
            NodeKey::Index(index) => format!("{}[{}]", parent, index),
        }
    }

    /// Compact rendering with object fields sorted by name.
    ///
    /// Two subtrees that differ only in the order of object fields render
    /// identically, which makes this the equality key used by the differ.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        self.write_canonical(&mut out);
        out
    }

    fn write_canonical(&self, out: &mut String) {
        match &self.value {
            NodeValue::Scalar(literal) => out.push_str(literal),
            NodeValue::Object(children) => {
                out.push('{');
                for (i, child) in sorted_fields(children).into_iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&quote(child.field_name().unwrap_or_default()));
                    out.push(':');
                    child.write_canonical(out);
                }
                out.push('}');
            }
            NodeValue::Array(children) => {
                out.push('[');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    child.write_canonical(out);
                }
                out.push(']');
            }
        }
    }

    /// Indented rendering, one line per scalar or bracket, fields sorted
    pub fn pretty_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        self.write_pretty(0, None, true, &mut lines);
        lines
    }

    fn write_pretty(&self, depth: usize, label: Option<&str>, last: bool, lines: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        let prefix = match label {
            Some(name) => format!("{}{}: ", indent, quote(name)),
            None => indent.clone(),
        };
        let comma = if last { "" } else { "," };

        let (open, close, children): (&str, &str, Vec<&Node>) = match &self.value {
            NodeValue::Scalar(literal) => {
                lines.push(format!("{}{}{}", prefix, literal, comma));
                return;
            }
            NodeValue::Object(children) => ("{", "}", sorted_fields(children)),
            NodeValue::Array(children) => ("[", "]", children.iter().collect()),
        };

        if children.is_empty() {
            lines.push(format!("{}{}{}{}", prefix, open, close, comma));
            return;
        }

        lines.push(format!("{}{}", prefix, open));
        let count = children.len();
        for (i, child) in children.into_iter().enumerate() {
            let child_label = match self.kind() {
                NodeKind::Object => child.field_name(),
                _ => None,
            };
            child.write_pretty(depth + 1, child_label, i + 1 == count, lines);
        }
        lines.push(format!("{}{}{}", indent, close, comma));
    }
}

fn sorted_fields(children: &[Node]) -> Vec<&Node> {
    let mut sorted: Vec<&Node> = children.iter().collect();
    sorted.sort_by(|a, b| a.field_name().cmp(&b.field_name()));
    sorted
}

/// Quote a string as a JSON string literal
pub fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("\"{}\"", text))
}

/// Canonical, comparison-ready form of a response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum NormalizedDocument {
    Json { root: Node, altered: bool },
    Xml { root: Node, altered: bool },
    Text { lines: Vec<String>, altered: bool },
}

impl NormalizedDocument {
    pub fn format(&self) -> ContentFormat {
        match self {
            NormalizedDocument::Json { .. } => ContentFormat::Json,
            NormalizedDocument::Xml { .. } => ContentFormat::Xml,
            NormalizedDocument::Text { .. } => ContentFormat::Text,
        }
    }

    /// Whether canonicalization changed the raw content
    pub fn altered(&self) -> bool {
        match self {
            NormalizedDocument::Json { altered, .. }
            | NormalizedDocument::Xml { altered, .. }
            | NormalizedDocument::Text { altered, .. } => *altered,
        }
    }

    /// Node count for trees, line count for text
    pub fn length(&self) -> usize {
        match self {
            NormalizedDocument::Json { root, .. } | NormalizedDocument::Xml { root, .. } => {
                root.node_count()
            }
            NormalizedDocument::Text { lines, .. } => lines.len(),
        }
    }

    pub fn tree(&self) -> Option<&Node> {
        match self {
            NormalizedDocument::Json { root, .. } | NormalizedDocument::Xml { root, .. } => {
                Some(root)
            }
            NormalizedDocument::Text { .. } => None,
        }
    }

    /// Human-readable canonical form, one entry per line
    pub fn canonical_lines(&self) -> Vec<String> {
        match self {
            NormalizedDocument::Json { root, .. } | NormalizedDocument::Xml { root, .. } => {
                root.pretty_lines()
            }
            NormalizedDocument::Text { lines, .. } => lines.clone(),
        }
    }

    pub fn canonical_text(&self) -> String {
        self.canonical_lines().join("\n")
    }
}

/// Kind of a single diff entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOp {
    Equal,
    Insert,
    Delete,
    Replace,
}

/// One step of a diff between two normalized documents
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffEntry {
    pub op: DiffOp,
    pub left_fragment: Option<String>,
    pub right_fragment: Option<String>,
    /// Line index (text) or pre-order node index (trees). Inserts index the
    /// right document, everything else the left one.
    pub position: usize,
    /// Tree path of the compared node, absent for text diffs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl DiffEntry {
    pub fn equal(position: usize, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            op: DiffOp::Equal,
            left_fragment: Some(left.into()),
            right_fragment: Some(right.into()),
            position,
            path: None,
        }
    }

    pub fn insert(position: usize, right: impl Into<String>) -> Self {
        Self {
            op: DiffOp::Insert,
            left_fragment: None,
            right_fragment: Some(right.into()),
            position,
            path: None,
        }
    }

    pub fn delete(position: usize, left: impl Into<String>) -> Self {
        Self {
            op: DiffOp::Delete,
            left_fragment: Some(left.into()),
            right_fragment: None,
            position,
            path: None,
        }
    }

    pub fn replace(position: usize, left: impl Into<String>, right: impl Into<String>) -> Self {
        Self {
            op: DiffOp::Replace,
            left_fragment: Some(left.into()),
            right_fragment: Some(right.into()),
            position,
            path: None,
        }
    }

    pub fn at_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn is_change(&self) -> bool {
        self.op != DiffOp::Equal
    }
}

/// Per-op counts of a diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub equal: usize,
    pub insert: usize,
    pub delete: usize,
    pub replace: usize,
}

/// Ordered sequence of diff entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffResult {
    pub entries: Vec<DiffEntry>,
}

impl DiffResult {
    pub fn new(entries: Vec<DiffEntry>) -> Self {
        Self { entries }
    }

    /// Number of entries whose op is not `Equal`
    pub fn diff_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_change()).count()
    }

    pub fn is_identical(&self) -> bool {
        self.diff_count() == 0
    }

    pub fn stats(&self) -> DiffStats {
        let mut stats = DiffStats::default();
        for entry in &self.entries {
            match entry.op {
                DiffOp::Equal => stats.equal += 1,
                DiffOp::Insert => stats.insert += 1,
                DiffOp::Delete => stats.delete += 1,
                DiffOp::Replace => stats.replace += 1,
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, DiffEntry> {
        self.entries.iter()
    }
}

/// Summary statistics of one comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonMetrics {
    pub left_length: usize,
    pub right_length: usize,
    pub diff_count: usize,
    pub normalized: bool,
    pub formats_matched: bool,
}
