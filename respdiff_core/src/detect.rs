use crate::normalizer::{parse_json, parse_xml};
use respdiff_common::ContentFormat;
use tracing::trace;

/// Classify a response body as JSON, XML or plain text.
///
/// A `Content-Type` naming JSON or XML wins outright. Otherwise the body is
/// sniffed: it must look like a document (`{`/`[` or `<` after leading
/// whitespace) and parse cleanly. Anything else is text, so this never fails.
pub fn detect_format(content_type: &str, body: &[u8]) -> ContentFormat {
    if is_json_content_type(content_type) {
        return ContentFormat::Json;
    }
    if is_xml_content_type(content_type) {
        return ContentFormat::Xml;
    }

    let format = sniff_body(body);
    trace!(
        "Sniffed {} for content type {:?} ({} bytes)",
        format,
        content_type,
        body.len()
    );
    format
}

pub fn is_json_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("json")
}

pub fn is_xml_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("xml")
}

fn sniff_body(body: &[u8]) -> ContentFormat {
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .map(|i| body[i]);

    match start {
        Some(b'{') | Some(b'[') if parse_json(body).is_ok() => ContentFormat::Json,
        Some(b'<') if parse_xml(body).is_ok() => ContentFormat::Xml,
        _ => ContentFormat::Text,
    }
}
