//! Component registry. Shared across renders and registerable at any
//! time; lookups during a render see whatever was registered when the
//! element is reached.

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::component::Component;

/// Tags with structural meaning that can never be components.
pub const RESERVED_TAGS: &[&str] = &["text", "slot"];

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    #[error("'{0}' is a reserved structural tag")]
    ReservedTag(String),
    #[error("invalid component name: '{0}'")]
    InvalidName(String),
}

#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: Arc<DashMap<String, Arc<Component>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component under its own name. Registering over an
    /// existing name replaces it; misconfiguration (reserved or invalid
    /// names) is rejected here, before any render can hit it.
    pub fn register(&self, component: Component) -> Result<(), RegistryError> {
        let name = component.name.clone();
        if RESERVED_TAGS.contains(&name.as_str()) {
            return Err(RegistryError::ReservedTag(name));
        }
        if !is_valid_name(&name) {
            return Err(RegistryError::InvalidName(name));
        }
        if self.components.insert(name.clone(), Arc::new(component)).is_some() {
            warn!(name, "component replaced");
        } else {
            debug!(name, "component registered");
        }
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Option<Arc<Component>> {
        self.components.get(name).map(|entry| Arc::clone(&entry))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }
}

/// Same shape the markup parser accepts for a tag name.
fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::RenderOutput;

    fn component(name: &str) -> Component {
        Component::from_sync(name, |_, _| Ok(RenderOutput::Empty))
    }

    #[test]
    fn test_register_and_resolve() {
        let registry = ComponentRegistry::new();
        registry.register(component("card")).unwrap();
        assert!(registry.resolve("card").is_some());
        assert!(registry.resolve("missing").is_none());
    }

    #[test]
    fn test_reserved_tags_rejected() {
        let registry = ComponentRegistry::new();
        for reserved in RESERVED_TAGS {
            assert_eq!(
                registry.register(component(reserved)),
                Err(RegistryError::ReservedTag(reserved.to_string()))
            );
        }
    }

    #[test]
    fn test_invalid_names_rejected() {
        let registry = ComponentRegistry::new();
        assert!(matches!(
            registry.register(component("")),
            Err(RegistryError::InvalidName(_))
        ));
        assert!(matches!(
            registry.register(component("1abc")),
            Err(RegistryError::InvalidName(_))
        ));
    }

    #[test]
    fn test_reregister_replaces() {
        let registry = ComponentRegistry::new();
        registry.register(component("card")).unwrap();
        registry.register(component("card")).unwrap();
        assert_eq!(registry.len(), 1);
    }
}
