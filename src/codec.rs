//! # Segment Codec
//!
//! Converts between flat segment lists and their textual markup form, and
//! owns the escaping rules for the five markup-significant characters
//! (`& < > " '`).
//!
//! The codec is intentionally dumb: [`parse`] delegates tag recognition to
//! the markup parser and flattens the resulting tree one level without any
//! directive evaluation. Template semantics (loops, conditions, bindings,
//! components) live in the renderer.

use base64::Engine;
use indexmap::IndexMap;
use tracing::debug;

use crate::element::{AttrValue, Element};
use crate::markup;
use crate::segment::Segment;
use crate::value::{Value, BYTES_PREFIX};

/// Escapes the markup-significant characters in `input`.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

/// Inverse of [`escape`]. Unknown or partial entities pass through
/// unchanged, which keeps the function idempotent on clean input.
pub fn unescape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        let entity = [
            ("&amp;", '&'),
            ("&lt;", '<'),
            ("&gt;", '>'),
            ("&quot;", '"'),
            ("&#39;", '\''),
            ("&apos;", '\''),
        ]
        .iter()
        .find(|(name, _)| rest.starts_with(name));
        match entity {
            Some((name, replacement)) => {
                out.push(*replacement);
                rest = &rest[name.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Serializes a segment list back into markup text.
///
/// Text segments pass through escaped; any other segment renders as a
/// self-closing tag whose attributes are the segment's data. A nested
/// segment list under the `children` key renders as a paired tag instead,
/// so quoted/forwarded bodies survive a round trip.
pub fn serialize(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        if let Some(text) = segment.text_content() {
            out.push_str(&escape(text));
            continue;
        }
        let children = match segment.data.get("children") {
            Some(Value::Segments(inner)) => Some(inner),
            _ => None,
        };
        out.push('<');
        out.push_str(&segment.kind);
        for (key, value) in &segment.data {
            if key == "children" && children.is_some() {
                continue;
            }
            match value {
                Value::Null => {}
                Value::Bool(true) => {
                    out.push(' ');
                    out.push_str(key);
                }
                Value::Bool(false) => {
                    out.push_str(" no-");
                    out.push_str(key);
                }
                other => {
                    out.push(' ');
                    out.push_str(key);
                    out.push_str("=\"");
                    out.push_str(&escape(&encode_attr(other)));
                    out.push('"');
                }
            }
        }
        match children {
            Some(inner) => {
                out.push('>');
                out.push_str(&serialize(inner));
                out.push_str("</");
                out.push_str(&segment.kind);
                out.push('>');
            }
            None => out.push_str("/>"),
        }
    }
    out
}

/// Parses markup text into a flat segment list.
///
/// Attribute values are unescaped by the markup parser; values that parse
/// as JSON decode to their native type, `base64://` payloads decode to
/// bytes, and everything else stays a plain string.
pub fn parse(input: &str) -> Vec<Segment> {
    let elements = markup::parse_markup(input);
    flatten(&elements)
}

/// Renders a compact, lossy preview (`{kind}(label)` for non-text
/// segments) for logs. Not a wire format.
pub fn to_display_text(segments: &[Segment]) -> String {
    let mut out = String::new();
    for segment in segments {
        if let Some(text) = segment.text_content() {
            out.push_str(text);
            continue;
        }
        let label = ["name", "url", "target", "id", "text"]
            .iter()
            .find_map(|key| segment.data.get(*key))
            .map(Value::to_string)
            .unwrap_or_default();
        out.push('{');
        out.push_str(&segment.kind);
        out.push('}');
        out.push('(');
        out.push_str(&label);
        out.push(')');
    }
    out
}

fn flatten(elements: &[Element]) -> Vec<Segment> {
    let mut segments = Vec::new();
    for element in elements {
        if let Some(text) = element.text_content() {
            segments.push(Segment::text(text));
            continue;
        }
        let mut data: IndexMap<String, Value> = IndexMap::new();
        for (key, attr) in &element.attrs {
            let value = match attr {
                AttrValue::Literal(Value::String(s)) => decode_attr(s),
                AttrValue::Literal(other) => other.clone(),
                // Dynamic constructs are not evaluated by the codec; keep
                // the expression text so nothing is silently lost.
                AttrValue::Binding(expr) => {
                    debug!(key, expr, "codec keeps binding as plain text");
                    Value::String(expr.clone())
                }
            };
            data.insert(key.clone(), value);
        }
        if !element.children.is_empty() {
            data.insert(
                "children".to_string(),
                Value::Segments(flatten(&element.children)),
            );
        }
        segments.push(Segment::new(element.tag.clone(), data));
    }
    segments
}

/// Every value gets an unambiguous textual form: bytes keep their
/// `base64://` prefix, everything else is JSON-encoded. Strings are
/// JSON-quoted too, so a string that merely looks like JSON (`"123"`,
/// `"true"`) comes back as the same string, not a number or boolean.
fn encode_attr(value: &Value) -> String {
    match value {
        Value::Bytes(b) => format!(
            "{}{}",
            BYTES_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(b)
        ),
        other => other.to_json().to_string(),
    }
}

fn decode_attr(raw: &str) -> Value {
    if let Some(encoded) = raw.strip_prefix(BYTES_PREFIX) {
        if let Ok(bytes) = base64::engine::general_purpose::STANDARD.decode(encoded) {
            return Value::Bytes(bytes);
        }
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(json) => Value::from_json(json),
        Err(_) => Value::String(raw.to_string()),
    }
}
