//! # Restricted Expression Language
//!
//! Dynamic bindings, directive conditions and interpolation spans all
//! evaluate through this module. It is a genuine restricted interpreter,
//! not a sandboxed host-language `eval`: expressions are lexed
//! ([`token`]), parsed into a small AST ([`ast`], [`parser`]) and walked
//! directly against the render context's variable map ([`evaluator`]).
//! The interpreter can only ever name what the AST can name, so there is
//! no host capability to deny at runtime — host-ish identifiers simply
//! resolve to null.
//!
//! ## Pipeline
//!
//! ```text
//! Expression Source → Lexer → Parser → AST → Evaluator → Value
//!                               ↑ cached per source string ↑
//! ```
//!
//! ## Failure model
//!
//! The public facade fails soft: a syntax error or an unresolved root
//! identifier yields the original source text as a string value, so a
//! malformed directive leaves its markup untouched instead of aborting the
//! surrounding render pass. Errors never escape [`ExpressionEvaluator`].

pub mod ast;
pub mod cache;
pub mod evaluator;
pub mod parser;
pub mod token;

pub use ast::{BinaryOperator, Expression, Literal, UnaryOperator};
pub use cache::ExpressionCache;
pub use evaluator::{EvalError, ExpressionEvaluator};
