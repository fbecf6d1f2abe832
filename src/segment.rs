//! # Message Segments
//!
//! A [`Segment`] is one typed, serializable unit of a chat message and the
//! sole wire contract handed to transport adapters. A render always
//! produces a fresh, ordered segment list; segments are never mutated once
//! constructed.
//!
//! The `kind` space is open: adapters that do not recognize a kind must
//! pass it through or drop it, never error, so nothing here restricts
//! `kind` to the built-in set.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Reserved kind for plain text runs.
pub const TEXT_KIND: &str = "text";

/// One typed unit of a message: a `kind` plus an ordered data map.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: String,
    #[serde(default)]
    pub data: IndexMap<String, Value>,
}

impl Segment {
    pub fn new(kind: impl Into<String>, data: IndexMap<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// A plain text run.
    pub fn text(content: impl Into<String>) -> Self {
        Self::new(
            TEXT_KIND,
            IndexMap::from([("text".to_string(), Value::String(content.into()))]),
        )
    }

    /// An image reference by URL.
    pub fn image(url: impl Into<String>) -> Self {
        Self::new(
            "image",
            IndexMap::from([("url".to_string(), Value::String(url.into()))]),
        )
    }

    /// A user mention.
    pub fn mention(target: impl Into<String>) -> Self {
        Self::new(
            "mention",
            IndexMap::from([("target".to_string(), Value::String(target.into()))]),
        )
    }

    /// A sticker / emoji reference.
    pub fn face(id: impl Into<String>) -> Self {
        Self::new(
            "face",
            IndexMap::from([("id".to_string(), Value::String(id.into()))]),
        )
    }

    /// A file attachment reference.
    pub fn file(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(
            "file",
            IndexMap::from([
                ("url".to_string(), Value::String(url.into())),
                ("name".to_string(), Value::String(name.into())),
            ]),
        )
    }

    pub fn is_text(&self) -> bool {
        self.kind == TEXT_KIND
    }

    /// The text content of a `text` segment, if any.
    pub fn text_content(&self) -> Option<&str> {
        if !self.is_text() {
            return None;
        }
        self.data.get("text").and_then(Value::as_str)
    }
}
