//! # Expression Evaluator
//!
//! Walks the expression AST directly against a variable map. Because the
//! interpreter resolves identifiers only through that map and calls only
//! the intrinsics named here, there is nothing to sandbox at runtime: an
//! expression cannot reach the process, filesystem, network, or any other
//! host capability no matter what it spells.
//!
//! Host-ish identifier names (`process`, `require`, `Buffer`, ...) are
//! still recognized explicitly so they resolve to null rather than being
//! reported as unresolved — callers relying on the soft-failure echo would
//! otherwise see the denied name reflected back as a string.

use std::collections::HashSet;

use indexmap::IndexMap;
use lazy_static::lazy_static;
use thiserror::Error;
use tracing::debug;

use super::ast::{BinaryOperator, Expression, Literal, UnaryOperator};
use super::cache::ExpressionCache;
use super::parser::{parse_expression, ExprParseError};
use super::token::{tokenize, LexError};
use crate::value::Value;
use std::sync::Arc;

lazy_static! {
    /// Identifiers that resolve to null unconditionally. These are the
    /// host-capability names a hostile or confused template might probe;
    /// they are not variables and never will be.
    static ref DENIED_NAMES: HashSet<&'static str> = HashSet::from([
        "process", "global", "globalThis", "window", "document", "require",
        "module", "exports", "Buffer", "eval", "Function", "fs", "net",
        "http", "https", "crypto", "fetch", "XMLHttpRequest", "WebAssembly",
        "Deno", "os", "child_process",
    ]);
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvalError {
    #[error("lex error: {0}")]
    Lex(#[from] LexError),
    #[error("parse error: {0}")]
    Parse(#[from] ExprParseError),
    #[error("unresolved identifier: {0}")]
    UnresolvedIdentifier(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("type error: {0}")]
    Type(String),
    #[error("division by zero")]
    DivisionByZero,
    #[error("wrong number of arguments for {function}: expected {expected}, got {got}")]
    Arity {
        function: String,
        expected: &'static str,
        got: usize,
    },
}

pub type EvalResult<T> = Result<T, EvalError>;

/// Variable scope handed to an evaluation: the flattened render-context
/// chain.
pub type Vars = IndexMap<String, Value>;

/// Compiles (with caching) and evaluates expressions. Shareable across
/// concurrent renders; the compiled-expression cache is its only state.
#[derive(Debug, Default)]
pub struct ExpressionEvaluator {
    cache: ExpressionCache,
}

impl ExpressionEvaluator {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: ExpressionCache::new(cache_capacity),
        }
    }

    /// Tokenizes and parses `source`, reusing the cached AST when this
    /// exact source string has been compiled before.
    pub fn compile(&self, source: &str) -> EvalResult<Arc<Expression>> {
        if let Some(compiled) = self.cache.get(source) {
            return Ok(compiled);
        }
        let tokens = tokenize(source)?;
        let expression = parse_expression(&tokens)?;
        Ok(self.cache.insert(source, expression))
    }

    /// Evaluates `source` against `vars`, failing soft: any error yields
    /// the original source text as a string value so the caller can leave
    /// the surrounding markup untouched.
    pub fn evaluate(&self, source: &str, vars: &Vars) -> Value {
        match self.try_evaluate(source, vars) {
            Ok(value) => value,
            Err(error) => {
                debug!(source, %error, "expression failed soft");
                Value::String(source.to_string())
            }
        }
    }

    /// Truthiness convenience for directive conditions. A failing
    /// condition is falsy: a subtree guarded by a broken expression is
    /// pruned rather than rendered.
    pub fn evaluate_truthy(&self, source: &str, vars: &Vars) -> bool {
        match self.try_evaluate(source, vars) {
            Ok(value) => value.is_truthy(),
            Err(error) => {
                debug!(source, %error, "condition failed, treating as false");
                false
            }
        }
    }

    /// Strict evaluation; errors propagate to the caller.
    pub fn try_evaluate(&self, source: &str, vars: &Vars) -> EvalResult<Value> {
        let compiled = self.compile(source)?;
        self.eval_expression(&compiled, vars)
    }

    pub fn eval_expression(&self, expr: &Expression, vars: &Vars) -> EvalResult<Value> {
        match expr {
            Expression::Literal(literal) => Ok(Self::eval_literal(literal)),
            Expression::Identifier(name) => self.eval_identifier(name, vars),
            Expression::Member { object, property } => {
                let object = self.eval_expression(object, vars)?;
                Ok(Self::eval_member(&object, property))
            }
            Expression::Index { object, index } => {
                let object = self.eval_expression(object, vars)?;
                let index = self.eval_expression(index, vars)?;
                Ok(Self::eval_index(&object, &index))
            }
            Expression::Call {
                function,
                arguments,
            } => {
                let arguments = arguments
                    .iter()
                    .map(|arg| self.eval_expression(arg, vars))
                    .collect::<EvalResult<Vec<_>>>()?;
                eval_intrinsic(function, &arguments)
            }
            Expression::Unary { op, operand } => {
                let operand = self.eval_expression(operand, vars)?;
                eval_unary_op(*op, &operand)
            }
            Expression::BinaryOp { op, left, right } => match op {
                // Short-circuit forms return the deciding operand itself.
                BinaryOperator::And => {
                    let left = self.eval_expression(left, vars)?;
                    if !left.is_truthy() {
                        return Ok(left);
                    }
                    self.eval_expression(right, vars)
                }
                BinaryOperator::Or => {
                    let left = self.eval_expression(left, vars)?;
                    if left.is_truthy() {
                        return Ok(left);
                    }
                    self.eval_expression(right, vars)
                }
                _ => {
                    let left = self.eval_expression(left, vars)?;
                    let right = self.eval_expression(right, vars)?;
                    eval_binary_op(*op, &left, &right)
                }
            },
            Expression::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval_expression(condition, vars)?.is_truthy() {
                    self.eval_expression(then_branch, vars)
                } else {
                    self.eval_expression(else_branch, vars)
                }
            }
            Expression::List(items) => Ok(Value::List(
                items
                    .iter()
                    .map(|item| self.eval_expression(item, vars))
                    .collect::<EvalResult<Vec<_>>>()?,
            )),
            Expression::Map(entries) => {
                let mut map = IndexMap::new();
                for (key, value) in entries {
                    map.insert(key.clone(), self.eval_expression(value, vars)?);
                }
                Ok(Value::Map(map))
            }
        }
    }

    fn eval_literal(literal: &Literal) -> Value {
        match literal {
            Literal::Integer(i) => Value::Integer(*i),
            Literal::Float(f) => Value::Float(*f),
            Literal::String(s) => Value::String(s.clone()),
            Literal::Boolean(b) => Value::Bool(*b),
            Literal::Null => Value::Null,
        }
    }

    fn eval_identifier(&self, name: &str, vars: &Vars) -> EvalResult<Value> {
        if DENIED_NAMES.contains(name) {
            debug!(name, "denied identifier resolved to null");
            return Ok(Value::Null);
        }
        vars.get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnresolvedIdentifier(name.to_string()))
    }

    /// Member access never errors: a missing key or access on a scalar is
    /// null, matching ordinary object semantics.
    fn eval_member(object: &Value, property: &str) -> Value {
        match object {
            Value::Map(map) => map.get(property).cloned().unwrap_or(Value::Null),
            Value::List(items) if property == "length" => Value::Integer(items.len() as i64),
            Value::String(s) if property == "length" => Value::Integer(s.chars().count() as i64),
            Value::Segments(segments) if property == "length" => {
                Value::Integer(segments.len() as i64)
            }
            _ => Value::Null,
        }
    }

    fn eval_index(object: &Value, index: &Value) -> Value {
        match (object, index) {
            (Value::List(items), Value::Integer(i)) => {
                if *i < 0 {
                    return Value::Null;
                }
                items.get(*i as usize).cloned().unwrap_or(Value::Null)
            }
            (Value::Map(map), Value::String(key)) => {
                map.get(key).cloned().unwrap_or(Value::Null)
            }
            (Value::String(s), Value::Integer(i)) => {
                if *i < 0 {
                    return Value::Null;
                }
                s.chars()
                    .nth(*i as usize)
                    .map(|c| Value::String(c.to_string()))
                    .unwrap_or(Value::Null)
            }
            _ => Value::Null,
        }
    }
}

fn eval_unary_op(op: UnaryOperator, operand: &Value) -> EvalResult<Value> {
    match op {
        UnaryOperator::Not => Ok(Value::Bool(!operand.is_truthy())),
        UnaryOperator::Negate => match operand {
            Value::Integer(i) => Ok(Value::Integer(i.wrapping_neg())),
            Value::Float(f) => Ok(Value::Float(-f)),
            other => Err(EvalError::Type(format!(
                "cannot negate {}",
                other.type_name()
            ))),
        },
    }
}

fn eval_binary_op(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    match op {
        BinaryOperator::Add => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(a.wrapping_add(*b))),
            (Value::String(_), _) | (_, Value::String(_)) => {
                Ok(Value::String(format!("{}{}", left, right)))
            }
            _ => numeric_op(op, left, right),
        },
        BinaryOperator::Subtract | BinaryOperator::Multiply => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => Ok(Value::Integer(match op {
                BinaryOperator::Subtract => a.wrapping_sub(*b),
                _ => a.wrapping_mul(*b),
            })),
            _ => numeric_op(op, left, right),
        },
        BinaryOperator::Divide => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                if a.wrapping_rem(*b) == 0 {
                    Ok(Value::Integer(a.wrapping_div(*b)))
                } else {
                    Ok(Value::Float(*a as f64 / *b as f64))
                }
            }
            _ => numeric_op(op, left, right),
        },
        BinaryOperator::Modulo => match (left, right) {
            (Value::Integer(a), Value::Integer(b)) => {
                if *b == 0 {
                    return Err(EvalError::DivisionByZero);
                }
                Ok(Value::Integer(a.wrapping_rem(*b)))
            }
            _ => numeric_op(op, left, right),
        },
        BinaryOperator::Equal => Ok(Value::Bool(values_equal(left, right))),
        BinaryOperator::NotEqual => Ok(Value::Bool(!values_equal(left, right))),
        BinaryOperator::LessThan
        | BinaryOperator::GreaterThan
        | BinaryOperator::LessThanEqual
        | BinaryOperator::GreaterThanEqual => compare(op, left, right),
        // Short-circuit forms are handled before operand evaluation.
        BinaryOperator::And | BinaryOperator::Or => unreachable!("short-circuit ops"),
    }
}

fn numeric_op(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    let (a, b) = match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => (a, b),
        _ => {
            return Err(EvalError::Type(format!(
                "cannot apply {:?} to {} and {}",
                op,
                left.type_name(),
                right.type_name()
            )))
        }
    };
    let result = match op {
        BinaryOperator::Add => a + b,
        BinaryOperator::Subtract => a - b,
        BinaryOperator::Multiply => a * b,
        BinaryOperator::Divide => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a / b
        }
        BinaryOperator::Modulo => {
            if b == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            a % b
        }
        _ => unreachable!("non-arithmetic op in numeric_op"),
    };
    Ok(Value::Float(result))
}

fn values_equal(left: &Value, right: &Value) -> bool {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => left == right,
    }
}

fn compare(op: BinaryOperator, left: &Value, right: &Value) -> EvalResult<Value> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.partial_cmp(b),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => {
                return Err(EvalError::Type(format!(
                    "cannot compare {} and {}",
                    left.type_name(),
                    right.type_name()
                )))
            }
        },
    };
    let ordering = match ordering {
        Some(ordering) => ordering,
        None => return Ok(Value::Bool(false)),
    };
    let result = match op {
        BinaryOperator::LessThan => ordering.is_lt(),
        BinaryOperator::GreaterThan => ordering.is_gt(),
        BinaryOperator::LessThanEqual => ordering.is_le(),
        BinaryOperator::GreaterThanEqual => ordering.is_ge(),
        _ => unreachable!("non-comparison op in compare"),
    };
    Ok(Value::Bool(result))
}

/// The closed intrinsic allow-list. Anything else is
/// [`EvalError::UnknownFunction`].
fn eval_intrinsic(function: &str, arguments: &[Value]) -> EvalResult<Value> {
    let arity = |expected: &'static str| EvalError::Arity {
        function: function.to_string(),
        expected,
        got: arguments.len(),
    };
    match function {
        "len" => {
            let [value] = arguments else {
                return Err(arity("1"));
            };
            match value {
                Value::String(s) => Ok(Value::Integer(s.chars().count() as i64)),
                Value::List(items) => Ok(Value::Integer(items.len() as i64)),
                Value::Map(map) => Ok(Value::Integer(map.len() as i64)),
                Value::Segments(segments) => Ok(Value::Integer(segments.len() as i64)),
                other => Err(EvalError::Type(format!(
                    "len() expects a string or collection, got {}",
                    other.type_name()
                ))),
            }
        }
        "upper" | "lower" | "trim" => {
            let [value] = arguments else {
                return Err(arity("1"));
            };
            let s = value.to_string();
            Ok(Value::String(match function {
                "upper" => s.to_uppercase(),
                "lower" => s.to_lowercase(),
                _ => s.trim().to_string(),
            }))
        }
        "abs" => {
            let [value] = arguments else {
                return Err(arity("1"));
            };
            match value {
                Value::Integer(i) => Ok(Value::Integer(i.wrapping_abs())),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(EvalError::Type(format!(
                    "abs() expects a number, got {}",
                    other.type_name()
                ))),
            }
        }
        "floor" | "ceil" | "round" => {
            let [value] = arguments else {
                return Err(arity("1"));
            };
            let f = value.as_f64().ok_or_else(|| {
                EvalError::Type(format!(
                    "{}() expects a number, got {}",
                    function,
                    value.type_name()
                ))
            })?;
            let rounded = match function {
                "floor" => f.floor(),
                "ceil" => f.ceil(),
                _ => f.round(),
            };
            Ok(Value::Integer(rounded as i64))
        }
        "min" | "max" => {
            if arguments.is_empty() {
                return Err(arity("1+"));
            }
            let mut best: Option<&Value> = None;
            for value in arguments {
                let f = value.as_f64().ok_or_else(|| {
                    EvalError::Type(format!(
                        "{}() expects numbers, got {}",
                        function,
                        value.type_name()
                    ))
                })?;
                let replace = match best.and_then(Value::as_f64) {
                    None => true,
                    Some(current) => {
                        if function == "min" {
                            f < current
                        } else {
                            f > current
                        }
                    }
                };
                if replace {
                    best = Some(value);
                }
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
        "split" => {
            let [Value::String(s), Value::String(sep)] = arguments else {
                return Err(arity("2 strings"));
            };
            Ok(Value::List(
                s.split(sep.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        "join" => {
            let [Value::List(items), Value::String(sep)] = arguments else {
                return Err(arity("list, string"));
            };
            Ok(Value::String(
                items
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(sep),
            ))
        }
        "contains" => {
            let [collection, needle] = arguments else {
                return Err(arity("2"));
            };
            let found = match collection {
                Value::String(s) => s.contains(&needle.to_string()),
                Value::List(items) => items.iter().any(|item| values_equal(item, needle)),
                Value::Map(map) => map.contains_key(&needle.to_string()),
                _ => false,
            };
            Ok(Value::Bool(found))
        }
        "keys" => {
            let [Value::Map(map)] = arguments else {
                return Err(arity("1 map"));
            };
            Ok(Value::List(
                map.keys().map(|k| Value::String(k.clone())).collect(),
            ))
        }
        other => Err(EvalError::UnknownFunction(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vars() -> Vars {
        IndexMap::from([
            ("count".to_string(), Value::Integer(3)),
            ("name".to_string(), Value::String("alice".to_string())),
            (
                "user".to_string(),
                Value::Map(IndexMap::from([(
                    "id".to_string(),
                    Value::Integer(42),
                )])),
            ),
            (
                "tags".to_string(),
                Value::List(vec![Value::String("a".to_string()), Value::String("b".to_string())]),
            ),
        ])
    }

    #[test]
    fn test_arithmetic() {
        let evaluator = ExpressionEvaluator::default();
        assert_eq!(evaluator.evaluate("1 + 2 * 3", &vars()), Value::Integer(7));
        assert_eq!(evaluator.evaluate("7 / 2", &vars()), Value::Float(3.5));
        assert_eq!(evaluator.evaluate("6 / 2", &vars()), Value::Integer(3));
        assert_eq!(evaluator.evaluate("7 % 2", &vars()), Value::Integer(1));
    }

    #[test]
    fn test_string_concat() {
        let evaluator = ExpressionEvaluator::default();
        assert_eq!(
            evaluator.evaluate("\"hi \" + name", &vars()),
            Value::String("hi alice".to_string())
        );
    }

    #[test]
    fn test_member_and_index() {
        let evaluator = ExpressionEvaluator::default();
        assert_eq!(evaluator.evaluate("user.id", &vars()), Value::Integer(42));
        assert_eq!(
            evaluator.evaluate("tags[1]", &vars()),
            Value::String("b".to_string())
        );
        assert_eq!(evaluator.evaluate("user.missing", &vars()), Value::Null);
        assert_eq!(evaluator.evaluate("tags[99]", &vars()), Value::Null);
    }

    #[test]
    fn test_ternary_and_logic() {
        let evaluator = ExpressionEvaluator::default();
        assert_eq!(
            evaluator.evaluate("count > 2 ? \"many\" : \"few\"", &vars()),
            Value::String("many".to_string())
        );
        // Short circuit returns the deciding operand.
        assert_eq!(
            evaluator.evaluate("null || name", &vars()),
            Value::String("alice".to_string())
        );
        assert_eq!(evaluator.evaluate("0 && count", &vars()), Value::Integer(0));
    }

    #[test]
    fn test_soft_failure_returns_source() {
        let evaluator = ExpressionEvaluator::default();
        assert_eq!(
            evaluator.evaluate("1+", &vars()),
            Value::String("1+".to_string())
        );
        assert_eq!(
            evaluator.evaluate("nosuchvar + 1", &vars()),
            Value::String("nosuchvar + 1".to_string())
        );
    }

    #[test]
    fn test_denied_identifiers_resolve_to_null() {
        let evaluator = ExpressionEvaluator::default();
        for denied in ["process", "require", "Buffer", "crypto", "fetch", "eval"] {
            assert_eq!(
                evaluator.try_evaluate(denied, &vars()),
                Ok(Value::Null),
                "{denied} must be denied"
            );
        }
    }

    #[test]
    fn test_intrinsics() {
        let evaluator = ExpressionEvaluator::default();
        assert_eq!(evaluator.evaluate("len(tags)", &vars()), Value::Integer(2));
        assert_eq!(
            evaluator.evaluate("upper(name)", &vars()),
            Value::String("ALICE".to_string())
        );
        assert_eq!(
            evaluator.evaluate("join(tags, \",\")", &vars()),
            Value::String("a,b".to_string())
        );
        assert_eq!(
            evaluator.evaluate("contains(tags, \"a\")", &vars()),
            Value::Bool(true)
        );
        assert_eq!(evaluator.evaluate("min(3, 1, 2)", &vars()), Value::Integer(1));
    }

    #[test]
    fn test_unknown_function_fails_soft() {
        let evaluator = ExpressionEvaluator::default();
        assert_eq!(
            evaluator.evaluate("launch_missiles()", &vars()),
            Value::String("launch_missiles()".to_string())
        );
    }

    #[test]
    fn test_truthy_convenience() {
        let evaluator = ExpressionEvaluator::default();
        assert!(evaluator.evaluate_truthy("count > 0", &vars()));
        assert!(!evaluator.evaluate_truthy("count > 99", &vars()));
        // Broken or unresolvable conditions prune, not render.
        assert!(!evaluator.evaluate_truthy("missing.thing >", &vars()));
    }

    #[test]
    fn test_list_and_map_literals_evaluate() {
        let evaluator = ExpressionEvaluator::default();
        assert_eq!(
            evaluator.evaluate("[1, count]", &vars()),
            Value::List(vec![Value::Integer(1), Value::Integer(3)])
        );
        assert_eq!(
            evaluator.evaluate("{id: user.id}", &vars()),
            Value::Map(IndexMap::from([("id".to_string(), Value::Integer(42))]))
        );
    }
}
