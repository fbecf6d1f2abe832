//! # Parsed Markup Nodes
//!
//! An [`Element`] is one node of the tree the markup parser produces: a tag
//! name, an ordered attribute map, children, and the two structural
//! directives (`for` / `if`) lifted out of the attributes. Text runs are
//! represented as elements with the reserved tag `text` and a single `text`
//! attribute.
//!
//! The tree is read-only during rendering and may be shared across
//! concurrent renders of the same template; the renderer resolves dynamic
//! bindings on a private per-render copy of the attributes it touches.

use indexmap::IndexMap;

use crate::value::Value;

/// Reserved tag for text runs.
pub const TEXT_TAG: &str = "text";

/// An attribute value: either a resolved literal or an expression to be
/// evaluated against the render context.
#[derive(Clone, Debug, PartialEq)]
pub enum AttrValue {
    Literal(Value),
    /// Dynamic binding, written `:key="expr"` in markup. The marker is
    /// stripped before the key is stored.
    Binding(String),
}

/// One parsed markup node.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Element {
    pub tag: String,
    pub attrs: IndexMap<String, AttrValue>,
    pub children: Vec<Element>,
    /// `for`-directive source in `name in source` form, lifted from attrs.
    pub loop_dir: Option<String>,
    /// `if`-directive condition expression, lifted from attrs.
    pub condition: Option<String>,
    /// The source span this element was parsed from, for diagnostics.
    pub source_span: Option<String>,
}

impl Element {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Default::default()
        }
    }

    /// A text-run element holding already-unescaped content.
    pub fn text(content: impl Into<String>) -> Self {
        let mut attrs = IndexMap::new();
        attrs.insert(
            "text".to_string(),
            AttrValue::Literal(Value::String(content.into())),
        );
        Self {
            tag: TEXT_TAG.to_string(),
            attrs,
            ..Default::default()
        }
    }

    pub fn is_text(&self) -> bool {
        self.tag == TEXT_TAG
    }

    pub fn text_content(&self) -> Option<&str> {
        if !self.is_text() {
            return None;
        }
        match self.attrs.get("text") {
            Some(AttrValue::Literal(Value::String(s))) => Some(s),
            _ => None,
        }
    }

    /// True when neither directive is present and no attribute is a
    /// dynamic binding, i.e. the element renders identically in any
    /// context.
    pub fn is_static(&self) -> bool {
        self.loop_dir.is_none()
            && self.condition.is_none()
            && self
                .attrs
                .values()
                .all(|attr| matches!(attr, AttrValue::Literal(_)))
            && self.children.iter().all(Element::is_static)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_element() {
        let element = Element::text("hi there");
        assert!(element.is_text());
        assert_eq!(element.text_content(), Some("hi there"));
        assert!(element.is_static());
    }

    #[test]
    fn test_binding_is_not_static() {
        let mut element = Element::new("avatar");
        element
            .attrs
            .insert("userId".to_string(), AttrValue::Binding("user.id".into()));
        assert!(!element.is_static());
    }
}
