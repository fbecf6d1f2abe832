//! # Markup Parser
//!
//! Tokenizes an author-written markup string into a tree of [`Element`]
//! nodes. The grammar is deliberately small: self-closing tags
//! (`<tag attrs/>`), paired tags (`<tag attrs>children</tag>`), and plain
//! text runs between and around them.
//!
//! ## Tolerance
//!
//! Chat-message templates are written by humans inside plugin code, so the
//! parser never fails hard. Anything that merely looks like a tag — an
//! unclosed element, a stray `</close>`, a bare `<` in prose — degrades to
//! a plain text element and parsing continues. `parse_markup` is therefore
//! infallible.
//!
//! ## Balancing
//!
//! Paired tags match the nearest *balanced* close tag of the same name:
//! `<quote><quote>inner</quote></quote>` nests two elements rather than
//! cutting the outer one short at the first `</quote>`. Balance falls out
//! of the recursive descent — an inner open tag consumes its own close
//! before the outer level ever sees it.
//!
//! ## Attributes and directives
//!
//! * `key="v"` / `key='v'` — literal string attribute (entity-unescaped)
//! * `key` — bare boolean flag, `true`
//! * `no-key` — negated flag, stored under `key` as `false`
//! * `:key="expr"` — dynamic binding; the marker is stripped and the raw
//!   expression stored for render-time evaluation
//! * `for="x in xs"` / `if="cond"` — lifted out of the attribute map into
//!   [`Element::loop_dir`] / [`Element::condition`]

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, multispace0, multispace1},
    combinator::{map, opt, recognize},
    error::context,
    multi::many0,
    sequence::{delimited, pair, preceded},
    IResult,
};
use tracing::debug;

use crate::codec::unescape;
use crate::element::{AttrValue, Element};
use crate::value::Value;

/// Attribute key prefix marking a dynamic binding.
const BINDING_MARKER: char = ':';
/// Bare-flag prefix meaning "set this flag false".
const NEGATION_PREFIX: &str = "no-";

/// Raw tag head before directive lifting: name, `(key, value?)` pairs and
/// whether the tag closed itself.
#[derive(Debug, Clone, PartialEq)]
struct RawTag {
    name: String,
    attrs: Vec<(String, Option<String>)>,
    self_closing: bool,
}

/// Splits a markup string into an ordered run of text and tag elements.
/// Never fails; malformed spans degrade to text.
#[tracing::instrument(level = "debug", skip(input))]
pub fn parse_markup(input: &str) -> Vec<Element> {
    let (elements, rest, _) = parse_run(input, None);
    debug_assert!(rest.is_empty());
    elements
}

/// Parses sibling elements until EOF or, when `close` is given, until the
/// matching close tag at this nesting level. Returns the elements, the
/// remaining input, and whether the close tag was found.
fn parse_run<'a>(input: &'a str, close: Option<&str>) -> (Vec<Element>, &'a str, bool) {
    let mut elements = Vec::new();
    let mut text_buf = String::new();
    let mut rest = input;

    loop {
        if rest.is_empty() {
            flush_text(&mut elements, &mut text_buf);
            return (elements, rest, false);
        }
        if let Some(name) = close {
            if let Ok((after, ())) = close_tag(rest, name) {
                flush_text(&mut elements, &mut text_buf);
                return (elements, after, true);
            }
        }
        if rest.starts_with('<') {
            match open_tag(rest) {
                Ok((after, raw)) => {
                    flush_text(&mut elements, &mut text_buf);
                    rest = consume_tag(&mut elements, rest, after, raw);
                }
                Err(_) => {
                    // Tag-looking but malformed: one char of plain text.
                    text_buf.push('<');
                    rest = &rest[1..];
                }
            }
        } else {
            let next = rest.find('<').unwrap_or(rest.len());
            text_buf.push_str(&rest[..next]);
            rest = &rest[next..];
        }
    }
}

/// Handles one successfully parsed open tag, recursing into children for
/// paired forms. Returns the input remaining after the whole element.
fn consume_tag<'a>(
    elements: &mut Vec<Element>,
    start: &'a str,
    after_open: &'a str,
    raw: RawTag,
) -> &'a str {
    if raw.self_closing {
        let span = &start[..start.len() - after_open.len()];
        elements.push(build_element(raw, Vec::new(), span));
        return after_open;
    }
    let (children, after_children, matched) = parse_run(after_open, Some(&raw.name));
    if matched {
        let span = &start[..start.len() - after_children.len()];
        elements.push(build_element(raw, children, span));
        after_children
    } else {
        // Unclosed paired tag: the open tag itself degrades to text and
        // whatever was parsed after it stays at this level.
        debug!(tag = %raw.name, "unclosed tag degraded to text");
        let open_src = &start[..start.len() - after_open.len()];
        elements.push(Element::text(unescape(open_src)));
        elements.extend(children);
        after_children
    }
}

fn flush_text(elements: &mut Vec<Element>, text_buf: &mut String) {
    if !text_buf.is_empty() {
        elements.push(Element::text(unescape(text_buf)));
        text_buf.clear();
    }
}

/// Lifts directives and binding markers out of the raw attribute list.
fn build_element(raw: RawTag, children: Vec<Element>, span: &str) -> Element {
    let mut element = Element::new(raw.name);
    element.children = children;
    element.source_span = Some(span.to_string());
    for (key, value) in raw.attrs {
        match value {
            None => {
                if let Some(stripped) = key.strip_prefix(NEGATION_PREFIX) {
                    element
                        .attrs
                        .insert(stripped.to_string(), AttrValue::Literal(Value::Bool(false)));
                } else {
                    element
                        .attrs
                        .insert(key, AttrValue::Literal(Value::Bool(true)));
                }
            }
            Some(value) => {
                let value = unescape(&value);
                if key == "for" {
                    element.loop_dir = Some(value);
                } else if key == "if" {
                    element.condition = Some(value);
                } else if let Some(stripped) = key.strip_prefix(BINDING_MARKER) {
                    element
                        .attrs
                        .insert(stripped.to_string(), AttrValue::Binding(value));
                } else {
                    element
                        .attrs
                        .insert(key, AttrValue::Literal(Value::String(value)));
                }
            }
        }
    }
    element
}

fn tag_name(input: &str) -> IResult<&str, &str> {
    context(
        "tag name",
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        )),
    )(input)
}

fn attr_key(input: &str) -> IResult<&str, &str> {
    context(
        "attribute key",
        recognize(pair(
            take_while1(|c: char| c.is_ascii_alphabetic() || c == BINDING_MARKER || c == '_'),
            take_while(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.'),
        )),
    )(input)
}

fn quoted_value(input: &str) -> IResult<&str, &str> {
    context(
        "attribute value",
        alt((
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        )),
    )(input)
}

fn attribute(input: &str) -> IResult<&str, (String, Option<String>)> {
    context(
        "attribute",
        map(
            pair(attr_key, opt(preceded(char('='), quoted_value))),
            |(key, value)| (key.to_string(), value.map(str::to_string)),
        ),
    )(input)
}

/// Parses `<name attrs>` or `<name attrs/>`. The trailing-`/` check runs
/// after the full attribute list, so a tag whose attribute string is a
/// prefix of another's can never be conflated with it.
fn open_tag(input: &str) -> IResult<&str, RawTag> {
    let (rest, _) = char('<')(input)?;
    let (rest, name) = tag_name(rest)?;
    let (rest, attrs) = many0(preceded(multispace1, attribute))(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, self_closing) = alt((map(tag("/>"), |_| true), map(char('>'), |_| false)))(rest)?;
    Ok((
        rest,
        RawTag {
            name: name.to_string(),
            attrs,
            self_closing,
        },
    ))
}

fn close_tag<'a>(input: &'a str, name: &str) -> IResult<&'a str, ()> {
    let (rest, _) = tag("</")(input)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = tag(name)(rest)?;
    let (rest, _) = multispace0(rest)?;
    let (rest, _) = char('>')(rest)?;
    Ok((rest, ()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_one(input: &str) -> Element {
        let mut elements = parse_markup(input);
        assert_eq!(elements.len(), 1, "expected one element from {input:?}");
        elements.remove(0)
    }

    #[test]
    fn test_plain_text() {
        let elements = parse_markup("hello world");
        assert_eq!(elements, vec![Element::text("hello world")]);
    }

    #[test]
    fn test_text_is_unescaped() {
        let elements = parse_markup("1 &lt; 2 &amp;&amp; 3 &gt; 2");
        assert_eq!(elements, vec![Element::text("1 < 2 && 3 > 2")]);
    }

    #[test]
    fn test_self_closing_tag() {
        let element = parse_one("<image url=\"https://example.com/a.png\"/>");
        assert_eq!(element.tag, "image");
        assert!(element.children.is_empty());
        assert_eq!(
            element.attrs.get("url"),
            Some(&AttrValue::Literal(Value::String(
                "https://example.com/a.png".to_string()
            )))
        );
    }

    #[test]
    fn test_paired_tag_with_text_child() {
        let element = parse_one("<b>bold</b>");
        assert_eq!(element.tag, "b");
        assert_eq!(element.children, vec![Element::text("bold")]);
    }

    #[test]
    fn test_text_around_tags() {
        let elements = parse_markup("before <face id=\"1\"/> after");
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0], Element::text("before "));
        assert_eq!(elements[1].tag, "face");
        assert_eq!(elements[2], Element::text(" after"));
    }

    #[test]
    fn test_nested_same_name_tags_balance() {
        let element = parse_one("<quote><quote>inner</quote></quote>");
        assert_eq!(element.tag, "quote");
        assert_eq!(element.children.len(), 1);
        let inner = &element.children[0];
        assert_eq!(inner.tag, "quote");
        assert_eq!(inner.children, vec![Element::text("inner")]);
    }

    #[test]
    fn test_self_closing_inside_paired_same_name() {
        let element = parse_one("<a><a/></a>");
        assert_eq!(element.tag, "a");
        assert_eq!(element.children.len(), 1);
        assert_eq!(element.children[0].tag, "a");
        assert!(element.children[0].children.is_empty());
    }

    #[test]
    fn test_attribute_prefix_not_conflated() {
        // One tag's attribute string is a prefix of the other's.
        let elements = parse_markup("<card title=\"a\"/><card title=\"a\" wide>x</card>");
        assert_eq!(elements.len(), 2);
        assert!(elements[0].children.is_empty());
        assert_eq!(elements[1].children, vec![Element::text("x")]);
        assert_eq!(
            elements[1].attrs.get("wide"),
            Some(&AttrValue::Literal(Value::Bool(true)))
        );
    }

    #[test]
    fn test_bare_flag_and_negated_flag() {
        let element = parse_one("<card wide no-border/>");
        assert_eq!(
            element.attrs.get("wide"),
            Some(&AttrValue::Literal(Value::Bool(true)))
        );
        assert_eq!(
            element.attrs.get("border"),
            Some(&AttrValue::Literal(Value::Bool(false)))
        );
    }

    #[test]
    fn test_binding_marker_stripped() {
        let element = parse_one("<avatar :user-id=\"session.userId\"/>");
        assert_eq!(
            element.attrs.get("user-id"),
            Some(&AttrValue::Binding("session.userId".to_string()))
        );
    }

    #[test]
    fn test_directives_lifted_from_attrs() {
        let element = parse_one("<item for=\"x in xs\" if=\"x.visible\" label=\"l\"/>");
        assert_eq!(element.loop_dir.as_deref(), Some("x in xs"));
        assert_eq!(element.condition.as_deref(), Some("x.visible"));
        assert!(!element.attrs.contains_key("for"));
        assert!(!element.attrs.contains_key("if"));
        assert!(element.attrs.contains_key("label"));
    }

    #[test]
    fn test_single_quoted_attribute() {
        let element = parse_one("<image url='a \"b\" c'/>");
        assert_eq!(
            element.attrs.get("url"),
            Some(&AttrValue::Literal(Value::String("a \"b\" c".to_string())))
        );
    }

    #[test]
    fn test_bare_angle_bracket_is_text() {
        let elements = parse_markup("1 < 2");
        assert_eq!(elements, vec![Element::text("1 < 2")]);
    }

    #[test]
    fn test_stray_close_tag_is_text() {
        let elements = parse_markup("oops</b>done");
        assert_eq!(elements, vec![Element::text("oops</b>done")]);
    }

    #[test]
    fn test_unclosed_tag_degrades_to_text() {
        let elements = parse_markup("<b>never closed");
        assert_eq!(
            elements,
            vec![Element::text("<b>"), Element::text("never closed")]
        );
    }

    #[test]
    fn test_source_span_recorded() {
        let element = parse_one("<b>bold</b>");
        assert_eq!(element.source_span.as_deref(), Some("<b>bold</b>"));
    }
}
