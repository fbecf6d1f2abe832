//! Render-time variable scope. Contexts are immutable after
//! construction and chained through `Arc` parents, so concurrent sibling
//! renders share scopes without locks.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::element::Element;
use crate::value::Value;

/// Opaque host handle (e.g. the chat session) threaded through a render
/// untouched. Components downcast it to whatever their host provides.
pub type SessionHandle = Arc<dyn Any + Send + Sync>;

/// A named block of children passed into a component, together with the
/// scope it was written in. Rendering a slot uses that capturing scope,
/// not the component's inner scope.
#[derive(Clone)]
pub struct Slot {
    pub elements: Vec<Element>,
    pub scope: Arc<RenderContext>,
}

impl fmt::Debug for Slot {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Slot")
            .field("elements", &self.elements.len())
            .finish()
    }
}

/// Name of the slot that collects children without a `slot` attribute.
pub const DEFAULT_SLOT: &str = "default";

pub struct RenderContext {
    vars: IndexMap<String, Value>,
    parent: Option<Arc<RenderContext>>,
    slots: IndexMap<String, Slot>,
    session: Option<SessionHandle>,
    /// Markup the root render started from, for diagnostics.
    root_source: Option<String>,
}

impl fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("RenderContext")
            .field("vars", &self.vars)
            .field("slots", &self.slots)
            .field("has_parent", &self.parent.is_some())
            .field("has_session", &self.session.is_some())
            .finish()
    }
}

impl Default for RenderContext {
    fn default() -> Self {
        Self::new(IndexMap::new())
    }
}

impl RenderContext {
    pub fn new(vars: IndexMap<String, Value>) -> Self {
        Self {
            vars,
            parent: None,
            slots: IndexMap::new(),
            session: None,
            root_source: None,
        }
    }

    pub fn with_session(mut self, session: SessionHandle) -> Self {
        self.session = Some(session);
        self
    }

    pub fn with_root_source(mut self, source: impl Into<String>) -> Self {
        self.root_source = Some(source.into());
        self
    }

    /// Child scope for a loop iteration or bound attribute block. The
    /// session handle and root source are inherited through the chain.
    pub fn child(self: &Arc<Self>, vars: IndexMap<String, Value>) -> Arc<Self> {
        Arc::new(Self {
            vars,
            parent: Some(Arc::clone(self)),
            slots: IndexMap::new(),
            session: None,
            root_source: None,
        })
    }

    /// Child scope for a component body, carrying its collected slots.
    pub fn child_with_slots(
        self: &Arc<Self>,
        vars: IndexMap<String, Value>,
        slots: IndexMap<String, Slot>,
    ) -> Arc<Self> {
        Arc::new(Self {
            vars,
            parent: Some(Arc::clone(self)),
            slots,
            session: None,
            root_source: None,
        })
    }

    /// Looks a variable up through the scope chain, nearest scope first.
    pub fn get(&self, name: &str) -> Option<&Value> {
        if let Some(value) = self.vars.get(name) {
            return Some(value);
        }
        self.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Nearest slot with this name in the scope chain.
    pub fn slot(&self, name: &str) -> Option<&Slot> {
        if let Some(slot) = self.slots.get(name) {
            return Some(slot);
        }
        self.parent.as_ref().and_then(|parent| parent.slot(name))
    }

    pub fn session(&self) -> Option<&SessionHandle> {
        if let Some(session) = &self.session {
            return Some(session);
        }
        self.parent.as_ref().and_then(|parent| parent.session())
    }

    pub fn root_source(&self) -> Option<&str> {
        if let Some(source) = &self.root_source {
            return Some(source.as_str());
        }
        self.parent
            .as_ref()
            .and_then(|parent| parent.root_source())
    }

    /// Flattens the scope chain into one map for the evaluator, child
    /// entries shadowing parent ones.
    pub fn flatten(&self) -> IndexMap<String, Value> {
        let mut flat = match &self.parent {
            Some(parent) => parent.flatten(),
            None => IndexMap::new(),
        };
        for (key, value) in &self.vars {
            flat.insert(key.clone(), value.clone());
        }
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_lookup_walks_chain() {
        let root = Arc::new(RenderContext::new(IndexMap::from([
            ("a".to_string(), Value::Integer(1)),
            ("b".to_string(), Value::Integer(2)),
        ])));
        let child = root.child(IndexMap::from([("b".to_string(), Value::Integer(20))]));
        assert_eq!(child.get("a"), Some(&Value::Integer(1)));
        assert_eq!(child.get("b"), Some(&Value::Integer(20)));
        assert_eq!(child.get("c"), None);
    }

    #[test]
    fn test_flatten_shadows_parent() {
        let root = Arc::new(RenderContext::new(IndexMap::from([
            ("x".to_string(), Value::Integer(1)),
        ])));
        let child = root.child(IndexMap::from([("x".to_string(), Value::Integer(2))]));
        assert_eq!(child.flatten()["x"], Value::Integer(2));
    }

    #[test]
    fn test_session_inherited() {
        let root = Arc::new(
            RenderContext::new(IndexMap::new()).with_session(Arc::new(42usize)),
        );
        let child = root.child(IndexMap::new());
        let session = child.session().unwrap();
        assert_eq!(session.downcast_ref::<usize>(), Some(&42));
    }
}
