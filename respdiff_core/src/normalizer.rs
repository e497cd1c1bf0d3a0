use quick_xml::escape::{escape, partial_escape, resolve_xml_entity};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use respdiff_common::{quote, ContentFormat, Node, NodeKey, NormalizedDocument, RespDiffError};
use serde_json::Value as JsonValue;
use std::borrow::Cow;
use tracing::debug;

/// Options that change how bodies are canonicalized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NormalizerOptions {
    /// Parse string values that hold a JSON object or array
    pub expand_embedded_json: bool,
}

impl Default for NormalizerOptions {
    fn default() -> Self {
        Self {
            expand_embedded_json: true,
        }
    }
}

/// Converts classified response bodies into comparison-ready documents
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    options: NormalizerOptions,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: NormalizerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> NormalizerOptions {
        self.options
    }

    /// Normalize a body that has already been classified.
    ///
    /// JSON and XML bodies that fail to parse are reported as
    /// `RespDiffError::Parse`; they are never downgraded to text here.
    pub fn normalize(
        &self,
        format: ContentFormat,
        body: &[u8],
    ) -> Result<NormalizedDocument, RespDiffError> {
        let document = match format {
            ContentFormat::Json => self.normalize_json(body)?,
            ContentFormat::Xml => normalize_xml(body)?,
            ContentFormat::Text => normalize_text(body),
        };

        debug!(
            "Normalized {} body of {} bytes into {} units (altered: {})",
            format,
            body.len(),
            document.length(),
            document.altered()
        );
        Ok(document)
    }

    fn normalize_json(&self, body: &[u8]) -> Result<NormalizedDocument, RespDiffError> {
        let value = parse_json(body)?;
        let root = json_to_node(NodeKey::Root, value, self.options.expand_embedded_json);
        let altered = String::from_utf8_lossy(body).as_ref() != root.canonical().as_str();
        Ok(NormalizedDocument::Json { root, altered })
    }
}

pub(crate) fn parse_json(body: &[u8]) -> Result<JsonValue, RespDiffError> {
    serde_json::from_slice(body).map_err(|e| RespDiffError::Parse {
        format: ContentFormat::Json,
        message: e.to_string(),
    })
}

fn json_to_node(key: NodeKey, value: JsonValue, expand_embedded: bool) -> Node {
    match value {
        JsonValue::Null => Node::scalar(key, "null"),
        JsonValue::Bool(b) => Node::scalar(key, b.to_string()),
        JsonValue::Number(n) => Node::scalar(key, n.to_string()),
        JsonValue::String(s) => match embedded_json(&s, expand_embedded) {
            Some(inner) => json_to_node(key, inner, expand_embedded),
            None => Node::scalar(key, quote(&s)),
        },
        JsonValue::Array(items) => Node::array(
            key,
            items
                .into_iter()
                .enumerate()
                .map(|(i, item)| json_to_node(NodeKey::Index(i), item, expand_embedded))
                .collect(),
        ),
        JsonValue::Object(map) => Node::object(
            key,
            map.into_iter()
                .map(|(name, item)| json_to_node(NodeKey::Field(name), item, expand_embedded))
                .collect(),
        ),
    }
}

/// A string value that itself holds a JSON object or array
fn embedded_json(text: &str, enabled: bool) -> Option<JsonValue> {
    if !enabled {
        return None;
    }
    let trimmed = text.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(text).ok()
}

/// A piece of element content, kept in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum XmlContent {
    Element(XmlElement),
    /// Character data with whitespace runs collapsed
    Text(String),
}

/// Parsed XML element before conversion into a node tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct XmlElement {
    pub name: String,
    /// Sorted by attribute name
    pub attributes: Vec<(String, String)>,
    pub content: Vec<XmlContent>,
}

impl XmlElement {
    fn open(start: &BytesStart<'_>) -> Result<Self, RespDiffError> {
        let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let value = attr.unescape_value().map_err(xml_error)?.into_owned();
            attributes.push((key, value));
        }
        attributes.sort();

        Ok(Self {
            name,
            attributes,
            content: Vec::new(),
        })
    }

    /// Append character data, merging with a directly preceding text run
    fn push_text(&mut self, text: &str) {
        match self.content.last_mut() {
            Some(XmlContent::Text(run)) => run.push_str(text),
            _ => self.content.push(XmlContent::Text(text.to_string())),
        }
    }

    /// Collapse whitespace in each text run and drop runs left empty
    fn close(&mut self) {
        self.content.retain_mut(|item| match item {
            XmlContent::Text(run) => {
                *run = run.split_whitespace().collect::<Vec<_>>().join(" ");
                !run.is_empty()
            }
            XmlContent::Element(_) => true,
        });
    }

    fn has_child_elements(&self) -> bool {
        self.content
            .iter()
            .any(|item| matches!(item, XmlContent::Element(_)))
    }

    /// Compact serialization with sorted attributes
    fn render(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.name);
        for (key, value) in &self.attributes {
            out.push(' ');
            out.push_str(key);
            out.push_str("=\"");
            out.push_str(&escape(value.as_str()));
            out.push('"');
        }
        if self.content.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        for item in &self.content {
            match item {
                XmlContent::Element(child) => child.render(out),
                XmlContent::Text(text) => out.push_str(&partial_escape(text.as_str())),
            }
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    /// Text-only elements keep their text under `#text`; once child elements
    /// are present, text runs sit between them in `#children`.
    fn into_node(self, key: NodeKey) -> Node {
        let mut fields = Vec::with_capacity(self.attributes.len() + 2);
        fields.push(Node::scalar(NodeKey::Field("#tag".to_string()), quote(&self.name)));
        for (name, value) in &self.attributes {
            fields.push(Node::scalar(NodeKey::Field(format!("@{}", name)), quote(value)));
        }

        if self.has_child_elements() {
            let children = self
                .content
                .into_iter()
                .enumerate()
                .map(|(i, item)| match item {
                    XmlContent::Element(child) => child.into_node(NodeKey::Index(i)),
                    XmlContent::Text(text) => Node::scalar(NodeKey::Index(i), quote(&text)),
                })
                .collect();
            fields.push(Node::array(NodeKey::Field("#children".to_string()), children));
        } else if let Some(XmlContent::Text(text)) = self.content.into_iter().next() {
            fields.push(Node::scalar(NodeKey::Field("#text".to_string()), quote(&text)));
        }
        Node::object(key, fields)
    }
}

fn xml_error(err: impl std::fmt::Display) -> RespDiffError {
    RespDiffError::Parse {
        format: ContentFormat::Xml,
        message: err.to_string(),
    }
}

/// Parse a well-formed XML document with exactly one root element
pub(crate) fn parse_xml(body: &[u8]) -> Result<XmlElement, RespDiffError> {
    let text = std::str::from_utf8(body).map_err(xml_error)?;
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(false);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(ref e) => {
                if root.is_some() && stack.is_empty() {
                    return Err(xml_error("multiple root elements"));
                }
                stack.push(XmlElement::open(e)?);
            }
            Event::Empty(ref e) => {
                let element = XmlElement::open(e)?;
                attach(&mut stack, &mut root, element)?;
            }
            Event::End(_) => {
                let mut element = stack
                    .pop()
                    .ok_or_else(|| xml_error("closing tag without matching opening tag"))?;
                element.close();
                attach(&mut stack, &mut root, element)?;
            }
            Event::Text(e) => {
                let content = e.decode().map_err(xml_error)?;
                push_text(&mut stack, &content)?;
            }
            Event::CData(e) => {
                let content = String::from_utf8_lossy(&e).into_owned();
                push_text(&mut stack, &content)?;
            }
            Event::GeneralRef(e) => {
                let raw = e.decode().map_err(xml_error)?;
                let resolved = resolve_entity(&raw)?;
                push_text(&mut stack, &resolved)?;
            }
            Event::Eof => break,
            Event::Comment(_) | Event::Decl(_) | Event::PI(_) | Event::DocType(_) => {}
        }
    }

    if let Some(open) = stack.last() {
        return Err(xml_error(format!("unclosed element <{}>", open.name)));
    }
    root.ok_or_else(|| xml_error("document has no root element"))
}

fn attach(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), RespDiffError> {
    match stack.last_mut() {
        Some(parent) => {
            parent.content.push(XmlContent::Element(element));
            Ok(())
        }
        None if root.is_none() => {
            *root = Some(element);
            Ok(())
        }
        None => Err(xml_error("multiple root elements")),
    }
}

fn push_text(stack: &mut [XmlElement], content: &str) -> Result<(), RespDiffError> {
    match stack.last_mut() {
        Some(current) => {
            current.push_text(content);
            Ok(())
        }
        None if content.trim().is_empty() => Ok(()),
        None => Err(xml_error("text outside of the root element")),
    }
}

fn resolve_entity(raw: &str) -> Result<String, RespDiffError> {
    if let Some(resolved) = resolve_xml_entity(raw) {
        return Ok(resolved.to_string());
    }

    let code = match raw.strip_prefix('#') {
        Some(rest) => match rest.strip_prefix('x').or_else(|| rest.strip_prefix('X')) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => rest.parse::<u32>().ok(),
        },
        None => None,
    };

    code.and_then(char::from_u32)
        .map(String::from)
        .ok_or_else(|| xml_error(format!("unknown entity &{};", raw)))
}

fn normalize_xml(body: &[u8]) -> Result<NormalizedDocument, RespDiffError> {
    let element = parse_xml(body)?;
    let mut compact = String::new();
    element.render(&mut compact);
    let altered = String::from_utf8_lossy(body).as_ref() != compact.as_str();

    Ok(NormalizedDocument::Xml {
        root: element.into_node(NodeKey::Root),
        altered,
    })
}

/// Split text into lines, dropping trailing whitespace on each line.
///
/// Leading whitespace and blank lines are kept.
fn normalize_text(body: &[u8]) -> NormalizedDocument {
    let text = String::from_utf8_lossy(body);
    let lines: Vec<String> = text.lines().map(|line| line.trim_end().to_string()).collect();
    let lossy = matches!(text, Cow::Owned(_));
    let altered = lossy || lines.join("\n").as_str() != text.as_ref();
    NormalizedDocument::Text { lines, altered }
}
