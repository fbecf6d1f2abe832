//! # Components
//!
//! A component is a named, registered render callback with a typed prop
//! schema. Every component is the same concrete record; convenience
//! constructors wrap plain functions and sync closures so hosts never
//! implement a trait just to register a callback.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use futures::future::BoxFuture;
use indexmap::IndexMap;
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;
use tracing::debug;

use crate::render::context::RenderContext;
use crate::segment::Segment;
use crate::value::Value;

/// Coerced, camel-cased prop map handed to `derive` and `render`.
pub type Props = IndexMap<String, Value>;

pub type RenderFn = Arc<
    dyn Fn(Props, Arc<RenderContext>) -> BoxFuture<'static, Result<RenderOutput, ComponentError>>
        + Send
        + Sync,
>;

pub type DeriveFn = Arc<
    dyn Fn(Props, Arc<RenderContext>) -> BoxFuture<'static, Result<Props, ComponentError>>
        + Send
        + Sync,
>;

/// What a component's render callback may produce.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutput {
    /// Nothing; the element vanishes from the output.
    Empty,
    /// Markup text, re-parsed and rendered again under the depth guard.
    Markup(String),
    /// Final segments, spliced into the output as-is.
    Segments(Vec<Segment>),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ComponentError {
    #[error("component '{component}' missing required prop '{prop}'")]
    MissingProp { component: String, prop: String },
    #[error("component '{component}' prop '{prop}' expects {expected}, got {got}")]
    PropType {
        component: String,
        prop: String,
        expected: PropType,
        got: String,
    },
    #[error("component '{component}' prop '{prop}' is not a valid date: {value}")]
    InvalidDate {
        component: String,
        prop: String,
        value: String,
    },
    #[error("derive failed: {0}")]
    Derive(String),
    #[error("render failed: {0}")]
    Render(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase")]
pub enum PropType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    /// No coercion; the raw attribute value passes through.
    Any,
}

/// Default supplied when an attribute is absent. Factories are invoked
/// anew on every render, so a default list or map is never shared
/// between renders.
#[derive(Clone)]
pub enum PropDefault {
    Value(Value),
    Factory(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl PropDefault {
    fn produce(&self) -> Value {
        match self {
            PropDefault::Value(value) => value.clone(),
            PropDefault::Factory(factory) => factory(),
        }
    }
}

impl fmt::Debug for PropDefault {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PropDefault::Value(value) => f.debug_tuple("Value").field(value).finish(),
            PropDefault::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PropSpec {
    pub prop_type: PropType,
    pub required: bool,
    pub default: Option<PropDefault>,
}

impl PropSpec {
    pub fn required(prop_type: PropType) -> Self {
        Self {
            prop_type,
            required: true,
            default: None,
        }
    }

    pub fn optional(prop_type: PropType) -> Self {
        Self {
            prop_type,
            required: false,
            default: None,
        }
    }

    pub fn with_default(prop_type: PropType, default: Value) -> Self {
        Self {
            prop_type,
            required: false,
            default: Some(PropDefault::Value(default)),
        }
    }

    pub fn with_factory<F>(prop_type: PropType, factory: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        Self {
            prop_type,
            required: false,
            default: Some(PropDefault::Factory(Arc::new(factory))),
        }
    }
}

#[derive(Clone)]
pub struct Component {
    pub name: String,
    pub props: IndexMap<String, PropSpec>,
    pub derive: Option<DeriveFn>,
    pub render: RenderFn,
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("props", &self.props)
            .field("derive", &self.derive.is_some())
            .finish()
    }
}

impl Component {
    /// Wraps an async render function.
    pub fn new<F, Fut>(name: impl Into<String>, render: F) -> Self
    where
        F: Fn(Props, Arc<RenderContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<RenderOutput, ComponentError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            props: IndexMap::new(),
            derive: None,
            render: Arc::new(move |props, ctx| Box::pin(render(props, ctx))),
        }
    }

    /// Wraps a synchronous render closure.
    pub fn from_sync<F>(name: impl Into<String>, render: F) -> Self
    where
        F: Fn(Props, Arc<RenderContext>) -> Result<RenderOutput, ComponentError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            props: IndexMap::new(),
            derive: None,
            render: Arc::new(move |props, ctx| {
                let output = render(props, ctx);
                Box::pin(async move { output })
            }),
        }
    }

    pub fn with_prop(mut self, name: impl Into<String>, spec: PropSpec) -> Self {
        self.props.insert(name.into(), spec);
        self
    }

    /// Attaches an async derive step that can enrich props before render,
    /// e.g. fetching a user record for a mention card.
    pub fn with_derive<F, Fut>(mut self, derive: F) -> Self
    where
        F: Fn(Props, Arc<RenderContext>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Props, ComponentError>> + Send + 'static,
    {
        self.derive = Some(Arc::new(move |props, ctx| Box::pin(derive(props, ctx))));
        self
    }

    /// Builds the prop map for one render: camel-cases hyphenated
    /// attribute keys, coerces declared props to their types, fills
    /// defaults (factories invoked fresh), and passes undeclared
    /// attributes through untouched.
    pub fn coerce_props(
        &self,
        attrs: IndexMap<String, Value>,
    ) -> Result<Props, ComponentError> {
        let mut raw: IndexMap<String, Value> = IndexMap::new();
        for (key, value) in attrs {
            raw.insert(camel_case(&key), value);
        }

        let mut props = Props::new();
        for (name, spec) in &self.props {
            match raw.shift_remove(name) {
                Some(value) => {
                    props.insert(name.clone(), self.coerce_value(name, spec, value)?);
                }
                None => match &spec.default {
                    Some(default) => {
                        props.insert(name.clone(), default.produce());
                    }
                    None if spec.required => {
                        return Err(ComponentError::MissingProp {
                            component: self.name.clone(),
                            prop: name.clone(),
                        });
                    }
                    None => {}
                },
            }
        }
        // Undeclared attributes flow through so wrapper components can
        // forward what they do not model.
        for (key, value) in raw {
            debug!(component = %self.name, prop = %key, "undeclared prop passed through");
            props.insert(key, value);
        }
        Ok(props)
    }

    fn coerce_value(
        &self,
        prop: &str,
        spec: &PropSpec,
        value: Value,
    ) -> Result<Value, ComponentError> {
        let mismatch = |got: &Value| ComponentError::PropType {
            component: self.name.clone(),
            prop: prop.to_string(),
            expected: spec.prop_type,
            got: got.type_name().to_string(),
        };
        match spec.prop_type {
            PropType::Any => Ok(value),
            PropType::String => match value {
                Value::String(_) => Ok(value),
                Value::Null | Value::Bytes(_) => Err(mismatch(&value)),
                other => Ok(Value::String(other.to_string())),
            },
            PropType::Number => match &value {
                Value::Integer(_) | Value::Float(_) => Ok(value),
                Value::String(s) => {
                    if let Ok(i) = s.parse::<i64>() {
                        Ok(Value::Integer(i))
                    } else if let Ok(f) = s.parse::<f64>() {
                        Ok(Value::Float(f))
                    } else {
                        Err(mismatch(&value))
                    }
                }
                _ => Err(mismatch(&value)),
            },
            PropType::Boolean => match &value {
                Value::Bool(_) => Ok(value),
                Value::String(s) if s == "true" => Ok(Value::Bool(true)),
                Value::String(s) if s == "false" => Ok(Value::Bool(false)),
                _ => Err(mismatch(&value)),
            },
            PropType::Date => match &value {
                Value::String(s) => self.coerce_date(prop, s),
                _ => Err(mismatch(&value)),
            },
            PropType::Object => match &value {
                Value::Map(_) => Ok(value),
                Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(json @ serde_json::Value::Object(_)) => Ok(Value::from_json(json)),
                    _ => Err(mismatch(&value)),
                },
                _ => Err(mismatch(&value)),
            },
            PropType::Array => match &value {
                Value::List(_) => Ok(value),
                Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                    Ok(json @ serde_json::Value::Array(_)) => Ok(Value::from_json(json)),
                    _ => Err(mismatch(&value)),
                },
                _ => Err(mismatch(&value)),
            },
        }
    }

    /// Dates accept RFC 3339 or a bare `YYYY-MM-DD`, both canonicalized
    /// to an RFC 3339 string.
    fn coerce_date(&self, prop: &str, raw: &str) -> Result<Value, ComponentError> {
        if let Ok(date_time) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Value::String(
                date_time.with_timezone(&Utc).to_rfc3339(),
            ));
        }
        if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            if let Some(midnight) = date.and_hms_opt(0, 0, 0) {
                return Ok(Value::String(midnight.and_utc().to_rfc3339()));
            }
        }
        Err(ComponentError::InvalidDate {
            component: self.name.clone(),
            prop: prop.to_string(),
            value: raw.to_string(),
        })
    }
}

/// `user-name` -> `userName`. Keys without hyphens are unchanged.
fn camel_case(key: &str) -> String {
    let mut parts = key.split('-');
    let mut out = String::with_capacity(key.len());
    if let Some(first) = parts.next() {
        out.push_str(first);
    }
    for part in parts {
        let mut chars = part.chars();
        if let Some(first) = chars.next() {
            out.extend(first.to_uppercase());
            out.push_str(chars.as_str());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn noop_component() -> Component {
        Component::from_sync("card", |_, _| Ok(RenderOutput::Empty))
    }

    #[test]
    fn test_camel_case() {
        assert_eq!(camel_case("user-name"), "userName");
        assert_eq!(camel_case("a-b-c"), "aBC");
        assert_eq!(camel_case("plain"), "plain");
    }

    #[test]
    fn test_coerce_number_from_string() {
        let component =
            noop_component().with_prop("count", PropSpec::required(PropType::Number));
        let props = component
            .coerce_props(IndexMap::from([(
                "count".to_string(),
                Value::String("42".to_string()),
            )]))
            .unwrap();
        assert_eq!(props["count"], Value::Integer(42));
    }

    #[test]
    fn test_missing_required_prop() {
        let component = noop_component().with_prop("id", PropSpec::required(PropType::String));
        let error = component.coerce_props(IndexMap::new()).unwrap_err();
        assert_eq!(
            error,
            ComponentError::MissingProp {
                component: "card".to_string(),
                prop: "id".to_string()
            }
        );
    }

    #[test]
    fn test_hyphenated_keys_camel_cased() {
        let component =
            noop_component().with_prop("userName", PropSpec::required(PropType::String));
        let props = component
            .coerce_props(IndexMap::from([(
                "user-name".to_string(),
                Value::String("alice".to_string()),
            )]))
            .unwrap();
        assert_eq!(props["userName"], Value::String("alice".to_string()));
    }

    #[test]
    fn test_factory_default_is_fresh_each_call() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);
        let component = noop_component().with_prop(
            "items",
            PropSpec::with_factory(PropType::Array, || {
                CALLS.fetch_add(1, Ordering::SeqCst);
                Value::List(vec![])
            }),
        );
        component.coerce_props(IndexMap::new()).unwrap();
        component.coerce_props(IndexMap::new()).unwrap();
        assert_eq!(CALLS.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_date_canonicalized_to_rfc3339() {
        let component = noop_component().with_prop("when", PropSpec::required(PropType::Date));
        let props = component
            .coerce_props(IndexMap::from([(
                "when".to_string(),
                Value::String("2024-02-29".to_string()),
            )]))
            .unwrap();
        assert_eq!(
            props["when"],
            Value::String("2024-02-29T00:00:00+00:00".to_string())
        );
    }

    #[test]
    fn test_undeclared_props_pass_through() {
        let component = noop_component();
        let props = component
            .coerce_props(IndexMap::from([(
                "extra".to_string(),
                Value::Integer(7),
            )]))
            .unwrap();
        assert_eq!(props["extra"], Value::Integer(7));
    }

    #[test]
    fn test_json_object_prop_from_string() {
        let component =
            noop_component().with_prop("meta", PropSpec::required(PropType::Object));
        let props = component
            .coerce_props(IndexMap::from([(
                "meta".to_string(),
                Value::String("{\"a\": 1}".to_string()),
            )]))
            .unwrap();
        assert_eq!(
            props["meta"],
            Value::Map(IndexMap::from([("a".to_string(), Value::Integer(1))]))
        );
    }
}
