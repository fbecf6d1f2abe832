//! # Tsumugi: Message Template Compiler & Component Renderer
//!
//! Tsumugi turns chat-bot message templates into flat segment lists ready
//! for an IM platform adapter. Templates mix literal text, platform
//! segments (`<image/>`, `<mention/>`), structural directives (`for`,
//! `if`, `:bind`, `{{ expr }}`) and host-registered components.
//!
//! ## Processing Pipeline
//!
//! ```text
//! Markup Text → Markup Parser → Element Tree → Renderer → Segments
//!                                   │
//!               Expression Lexer → Parser → AST → Evaluator
//! ```
//!
//! ### Stage 1: Markup Parsing
//!
//! The [`markup`] module parses markup text into a tree of [`element::Element`]
//! nodes. Parsing is tolerant: malformed tag-looking text degrades to plain
//! text and never fails a render.
//!
//! ### Stage 2: Expression Compilation
//!
//! The [`expr`] module compiles `{{ expr }}` spans, `:bind` attributes and
//! directive sources into a small restricted AST, cached per source string.
//! The interpreter can only read context variables and call a fixed set of
//! intrinsics; there is no host access to escape from.
//!
//! ### Stage 3: Rendering
//!
//! The [`render`] module walks the tree asynchronously, expanding loops,
//! pruning falsy conditions, invoking registered [`component`]s and joining
//! sibling output in document order. Per-element failures become inline
//! error segments; siblings keep rendering.
//!
//! ### Wire Format
//!
//! The [`segment`] and [`codec`] modules define the flat segment list and
//! its textual form, including the escaping rules shared with the parser.
//!
//! ## Components
//!
//! Hosts register [`component::Component`]s in a [`registry::ComponentRegistry`];
//! each declares a typed prop schema and async `derive`/`render` callbacks.
//! Component markup output is re-parsed and re-rendered under a bounded
//! depth guard ([`config::RenderConfig`]).

pub mod codec;
pub mod component;
pub mod config;
pub mod element;
pub mod error;
pub mod expr;
pub mod markup;
pub mod registry;
pub mod render;
pub mod segment;
pub mod value;

// Re-exports
pub use component::{Component, ComponentError, PropSpec, PropType, Props, RenderOutput};
pub use config::RenderConfig;
pub use element::{AttrValue, Element};
pub use error::{Error, Result};
pub use registry::{ComponentRegistry, RegistryError};
pub use render::context::{RenderContext, SessionHandle, Slot};
pub use render::{RenderError, Renderer};
pub use segment::Segment;
pub use value::Value;
