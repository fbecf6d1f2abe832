//! # Renderer
//!
//! Depth-first async walk over a parsed element tree. Sibling subtrees
//! and loop iterations fan out concurrently and join in document order,
//! so output order never depends on which future resolves first.
//!
//! Failures are contained per element: a broken prop, derive, render
//! callback or depth overflow becomes one visible text segment in place
//! of the failed subtree while its siblings render normally. The only
//! way to get no output at all is to render nothing.

pub mod context;

use std::sync::Arc;

use async_recursion::async_recursion;
use futures::future::join_all;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::{debug, warn};

use crate::codec;
use crate::component::{ComponentError, RenderOutput};
use crate::config::RenderConfig;
use crate::element::{AttrValue, Element};
use crate::expr::ExpressionEvaluator;
use crate::markup::parse_markup;
use crate::registry::ComponentRegistry;
use crate::segment::Segment;
use crate::value::Value;

use context::{RenderContext, Slot, DEFAULT_SLOT};

lazy_static! {
    static ref CANONICAL_SPAN: Regex = Regex::new(r"\{\{(.+?)\}\}").unwrap();
    // Both dialects in one alternation: interpolation must be a single
    // pass, or values substituted by one dialect would be rescanned as
    // templates by the other.
    static ref DUAL_SPAN: Regex = Regex::new(r"\{\{(.+?)\}\}|\$\{([^}]+)\}").unwrap();
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error(transparent)]
    Component(#[from] ComponentError),
    #[error("render depth limit ({0}) exceeded")]
    DepthExceeded(usize),
    #[error("invalid loop source: {0}")]
    LoopSource(String),
    #[error("invalid loop directive: {0}")]
    LoopDirective(String),
}

/// Result of interpolating one text run.
enum Interpolated {
    Text(String),
    /// The run was a single span whose expression produced segments.
    Segments(Vec<Segment>),
}

pub struct Renderer {
    registry: ComponentRegistry,
    evaluator: Arc<ExpressionEvaluator>,
    config: RenderConfig,
}

impl Renderer {
    pub fn new(registry: ComponentRegistry) -> Self {
        Self::with_config(registry, RenderConfig::default())
    }

    pub fn with_config(registry: ComponentRegistry, config: RenderConfig) -> Self {
        Self {
            registry,
            evaluator: Arc::new(ExpressionEvaluator::new(config.expr_cache_capacity)),
            config,
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn evaluator(&self) -> &Arc<ExpressionEvaluator> {
        &self.evaluator
    }

    /// Renders markup text into a flat segment list. The parsed tree is
    /// private to this call; the same source can render concurrently
    /// under different contexts.
    #[tracing::instrument(level = "debug", skip_all, fields(len = source.len()))]
    pub async fn render(&self, source: &str, ctx: &Arc<RenderContext>) -> Vec<Segment> {
        let elements = parse_markup(source);
        self.render_elements(&elements, ctx, 0).await
    }

    /// Renders an already-built segment list, so templates embedded in
    /// segment text get their directives and components expanded.
    pub async fn render_segments(
        &self,
        segments: &[Segment],
        ctx: &Arc<RenderContext>,
    ) -> Vec<Segment> {
        self.render(&codec::serialize(segments), ctx).await
    }

    /// Renders a pre-parsed tree. Trees from [`parse_markup`] are
    /// read-only here and safe to share across concurrent renders.
    pub async fn render_elements(
        &self,
        elements: &[Element],
        ctx: &Arc<RenderContext>,
        depth: usize,
    ) -> Vec<Segment> {
        let rendered = join_all(
            elements
                .iter()
                .map(|element| self.render_element(element, ctx, depth)),
        )
        .await;
        rendered.into_iter().flatten().collect()
    }

    /// Containment boundary: every failure below becomes one error
    /// segment here and the caller's remaining siblings proceed.
    #[async_recursion]
    async fn render_element(
        &self,
        element: &Element,
        ctx: &Arc<RenderContext>,
        depth: usize,
    ) -> Vec<Segment> {
        match self.try_render_element(element, ctx, depth).await {
            Ok(segments) => segments,
            Err(error) => {
                warn!(tag = %element.tag, %error, "element failed, emitting error segment");
                vec![self.error_segment(&element.tag, &error)]
            }
        }
    }

    async fn try_render_element(
        &self,
        element: &Element,
        ctx: &Arc<RenderContext>,
        depth: usize,
    ) -> Result<Vec<Segment>, RenderError> {
        if depth >= self.config.max_render_depth {
            return Err(RenderError::DepthExceeded(self.config.max_render_depth));
        }

        // Loop first; the condition is then checked per iteration on the
        // loop-stripped copy.
        if let Some(directive) = &element.loop_dir {
            return self.render_loop(element, directive, ctx, depth).await;
        }

        if let Some(condition) = &element.condition {
            if !self.evaluator.evaluate_truthy(condition, &ctx.flatten()) {
                return Ok(Vec::new());
            }
        }

        if let Some(text) = element.text_content() {
            return Ok(match self.interpolate(text, &ctx.flatten()) {
                Interpolated::Text(rendered) if rendered.is_empty() => Vec::new(),
                Interpolated::Text(rendered) => vec![Segment::text(rendered)],
                Interpolated::Segments(segments) => segments,
            });
        }

        if element.tag == "slot" {
            return Ok(self.render_slot(element, ctx, depth).await);
        }

        if let Some(component) = self.registry.resolve(&element.tag) {
            return self.render_component(&component, element, ctx, depth).await;
        }

        Ok(vec![self.render_passthrough(element, ctx, depth).await])
    }

    /// Expands `for="name in source"`. The source may be a non-negative
    /// integer (counts up from zero) or any expression yielding a list
    /// or such an integer. Iterations render concurrently and join in
    /// index order.
    async fn render_loop(
        &self,
        element: &Element,
        directive: &str,
        ctx: &Arc<RenderContext>,
        depth: usize,
    ) -> Result<Vec<Segment>, RenderError> {
        let (name, source) = directive
            .split_once(" in ")
            .map(|(n, s)| (n.trim(), s.trim()))
            .filter(|(n, s)| !n.is_empty() && !s.is_empty())
            .ok_or_else(|| RenderError::LoopDirective(directive.to_string()))?;

        let items = match self.evaluator.try_evaluate(source, &ctx.flatten()) {
            Ok(Value::List(items)) => items,
            Ok(Value::Integer(n)) if n >= 0 => (0..n).map(Value::Integer).collect(),
            Ok(other) => {
                return Err(RenderError::LoopSource(format!(
                    "'{}' yields {}, expected list or non-negative integer",
                    source,
                    other.type_name()
                )))
            }
            Err(error) => return Err(RenderError::LoopSource(error.to_string())),
        };
        debug!(name, source, count = items.len(), "expanding loop");

        let iterations: Vec<(Element, Arc<RenderContext>)> = items
            .into_iter()
            .map(|item| {
                let mut iteration = element.clone();
                iteration.loop_dir = None;
                let scope = ctx.child(IndexMap::from([(name.to_string(), item)]));
                (iteration, scope)
            })
            .collect();

        let rendered = join_all(
            iterations
                .iter()
                .map(|(iteration, scope)| self.render_element(iteration, scope, depth + 1)),
        )
        .await;
        Ok(rendered.into_iter().flatten().collect())
    }

    /// The reserved `slot` tag: renders the matching block collected at
    /// the component call site, in that call site's scope. Falls back to
    /// its own children when no block was passed.
    async fn render_slot(
        &self,
        element: &Element,
        ctx: &Arc<RenderContext>,
        depth: usize,
    ) -> Vec<Segment> {
        let name = match element.attrs.get("name") {
            Some(AttrValue::Literal(Value::String(name))) => name.as_str(),
            _ => DEFAULT_SLOT,
        };
        match ctx.slot(name) {
            Some(slot) => {
                let slot = slot.clone();
                self.render_elements(&slot.elements, &slot.scope, depth + 1)
                    .await
            }
            None => {
                self.render_elements(&element.children, ctx, depth + 1)
                    .await
            }
        }
    }

    async fn render_component(
        &self,
        component: &crate::component::Component,
        element: &Element,
        ctx: &Arc<RenderContext>,
        depth: usize,
    ) -> Result<Vec<Segment>, RenderError> {
        let vars = ctx.flatten();
        let slots = self.collect_slots(&element.children, ctx);
        let raw = self.resolve_attrs(element, &vars);

        let mut props = component.coerce_props(raw)?;
        if let Some(derive) = &component.derive {
            props = derive(props, Arc::clone(ctx)).await?;
        }
        let scope = ctx.child_with_slots(props.clone(), slots);

        match (component.render)(props, Arc::clone(&scope)).await? {
            RenderOutput::Empty => Ok(Vec::new()),
            RenderOutput::Segments(segments) => Ok(segments),
            // Produced markup may itself use components, so it goes back
            // through the pipeline one level deeper.
            RenderOutput::Markup(markup) => {
                let elements = parse_markup(&markup);
                Ok(self.render_elements(&elements, &scope, depth + 1).await)
            }
        }
    }

    /// Unregistered tags pass through structurally: bindings resolved,
    /// children rendered, everything packed into one segment.
    async fn render_passthrough(
        &self,
        element: &Element,
        ctx: &Arc<RenderContext>,
        depth: usize,
    ) -> Segment {
        let vars = ctx.flatten();
        let mut data = self.resolve_attrs(element, &vars);
        if !element.children.is_empty() {
            let children = self
                .render_elements(&element.children, ctx, depth + 1)
                .await;
            data.insert("children".to_string(), Value::Segments(children));
        }
        Segment::new(element.tag.clone(), data)
    }

    /// Per-render attribute resolution. The element itself is never
    /// mutated; bindings evaluate fail-soft and string literals get
    /// interpolated.
    fn resolve_attrs(
        &self,
        element: &Element,
        vars: &IndexMap<String, Value>,
    ) -> IndexMap<String, Value> {
        element
            .attrs
            .iter()
            .map(|(key, attr)| {
                let value = match attr {
                    AttrValue::Binding(expr) => self.evaluator.evaluate(expr, vars),
                    AttrValue::Literal(Value::String(s)) => match self.interpolate(s, vars) {
                        Interpolated::Text(text) => Value::String(text),
                        Interpolated::Segments(segments) => Value::Segments(segments),
                    },
                    AttrValue::Literal(other) => other.clone(),
                };
                (key.clone(), value)
            })
            .collect()
    }

    fn interpolate(&self, text: &str, vars: &IndexMap<String, Value>) -> Interpolated {
        // A run that is exactly one span may yield segments wholesale,
        // e.g. `{{ quoted.children }}`.
        if let Some(expr) = self.sole_span(text) {
            if let Ok(Value::Segments(segments)) = self.evaluator.try_evaluate(&expr, vars) {
                return Interpolated::Segments(segments);
            }
        }

        let pattern: &Regex = if self.config.legacy_interpolation {
            &DUAL_SPAN
        } else {
            &CANONICAL_SPAN
        };
        let out = pattern.replace_all(text, |caps: &regex::Captures| {
            let expr = caps
                .get(1)
                .or_else(|| caps.get(2))
                .map(|span| span.as_str().trim())
                .unwrap_or_default();
            match self.evaluator.try_evaluate(expr, vars) {
                Ok(value) => value.to_string(),
                // Broken or unresolvable span stays as written.
                Err(_) => caps[0].to_string(),
            }
        });
        Interpolated::Text(out.into_owned())
    }

    /// Returns the inner expression when the trimmed run is exactly one
    /// interpolation span.
    fn sole_span(&self, text: &str) -> Option<String> {
        let trimmed = text.trim();
        let inner = trimmed
            .strip_prefix("{{")
            .and_then(|rest| rest.strip_suffix("}}"))
            .or_else(|| {
                if self.config.legacy_interpolation {
                    trimmed
                        .strip_prefix("${")
                        .and_then(|rest| rest.strip_suffix('}'))
                } else {
                    None
                }
            })?;
        if inner.contains('{') || inner.contains('}') {
            return None;
        }
        Some(inner.trim().to_string())
    }

    fn error_segment(&self, tag: &str, error: &RenderError) -> Segment {
        Segment::text(format!(
            "[{} ({}): {}]",
            self.config.error_prefix, tag, error
        ))
    }

    /// Groups a component element's children by their `slot` attribute;
    /// children without one land in the default slot. The capturing
    /// scope travels with each block.
    fn collect_slots(
        &self,
        children: &[Element],
        ctx: &Arc<RenderContext>,
    ) -> IndexMap<String, Slot> {
        let mut buckets: IndexMap<String, Vec<Element>> = IndexMap::new();
        for child in children {
            match child.attrs.get("slot") {
                Some(AttrValue::Literal(Value::String(name))) => {
                    let mut stripped = child.clone();
                    stripped.attrs.shift_remove("slot");
                    buckets.entry(name.clone()).or_default().push(stripped);
                }
                _ => {
                    buckets
                        .entry(DEFAULT_SLOT.to_string())
                        .or_default()
                        .push(child.clone());
                }
            }
        }
        buckets
            .into_iter()
            .map(|(name, elements)| {
                (
                    name,
                    Slot {
                        elements,
                        scope: Arc::clone(ctx),
                    },
                )
            })
            .collect()
    }
}
