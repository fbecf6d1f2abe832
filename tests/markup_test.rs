use pretty_assertions::assert_eq;

use tsumugi::element::{AttrValue, Element};
use tsumugi::markup::parse_markup;
use tsumugi::value::Value;

#[test]
fn test_mixed_text_and_tags() {
    let elements = parse_markup("hello <image url=\"x.png\"/> world");
    assert_eq!(elements.len(), 3);
    assert_eq!(elements[0].text_content(), Some("hello "));
    assert_eq!(elements[1].tag, "image");
    assert_eq!(elements[2].text_content(), Some(" world"));
}

#[test]
fn test_paired_tag_children() {
    let elements = parse_markup("<quote>inner <b>bold</b></quote>");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].tag, "quote");
    assert_eq!(elements[0].children.len(), 2);
    assert_eq!(elements[0].children[1].tag, "b");
}

#[test]
fn test_nearest_balanced_close_tag() {
    let elements = parse_markup("<quote><quote>inner</quote></quote>");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].children.len(), 1);
    assert_eq!(elements[0].children[0].tag, "quote");
    assert_eq!(
        elements[0].children[0].children[0].text_content(),
        Some("inner")
    );
}

#[test]
fn test_self_closing_inside_same_tag() {
    let elements = parse_markup("<a><a/></a>");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].children.len(), 1);
    assert!(elements[0].children[0].children.is_empty());
}

#[test]
fn test_malformed_tag_degrades_to_text() {
    let elements = parse_markup("1 < 2 and 2 > 1");
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].text_content(), Some("1 < 2 and 2 > 1"));
}

#[test]
fn test_unclosed_tag_degrades_open_tag_to_text() {
    let elements = parse_markup("<quote>dangling");
    assert_eq!(elements.len(), 2);
    assert_eq!(elements[0].text_content(), Some("<quote>"));
    assert_eq!(elements[1].text_content(), Some("dangling"));
}

#[test]
fn test_directives_lifted_out_of_attrs() {
    let elements = parse_markup("<item for=\"x in xs\" if=\"x\" :label=\"x.name\"/>");
    let element = &elements[0];
    assert_eq!(element.loop_dir.as_deref(), Some("x in xs"));
    assert_eq!(element.condition.as_deref(), Some("x"));
    assert_eq!(
        element.attrs.get("label"),
        Some(&AttrValue::Binding("x.name".to_string()))
    );
    assert!(element.attrs.get("for").is_none());
    assert!(element.attrs.get("if").is_none());
}

#[test]
fn test_flag_attributes() {
    let elements = parse_markup("<audio autoplay no-loop/>");
    let element = &elements[0];
    assert_eq!(
        element.attrs.get("autoplay"),
        Some(&AttrValue::Literal(Value::Bool(true)))
    );
    assert_eq!(
        element.attrs.get("loop"),
        Some(&AttrValue::Literal(Value::Bool(false)))
    );
}

#[test]
fn test_attribute_values_unescaped() {
    let elements = parse_markup("<card title=\"a &lt; b\"/>");
    assert_eq!(
        elements[0].attrs.get("title"),
        Some(&AttrValue::Literal(Value::String("a < b".to_string())))
    );
}

#[test]
fn test_entities_in_text_unescaped() {
    let elements = parse_markup("x &amp;&amp; y");
    assert_eq!(elements, vec![Element::text("x && y")]);
}

#[test]
fn test_empty_input() {
    assert!(parse_markup("").is_empty());
}
