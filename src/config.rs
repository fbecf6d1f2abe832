//! Renderer configuration, deserializable from host config files. Every
//! field has a default so an empty object is a valid configuration.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Recursion-depth limit covering structural nesting, loop expansion
    /// and component markup re-rendering. Overflow fails soft as an
    /// error segment.
    #[serde(default = "default_max_render_depth")]
    pub max_render_depth: usize,

    /// Capacity of the compiled-expression cache.
    #[serde(default = "default_expr_cache_capacity")]
    pub expr_cache_capacity: usize,

    /// Accept `${ expr }` interpolation spans alongside the canonical
    /// `{{ expr }}` form.
    #[serde(default = "default_legacy_interpolation")]
    pub legacy_interpolation: bool,

    /// Prefix of the inline error segment emitted when an element fails.
    #[serde(default = "default_error_prefix")]
    pub error_prefix: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_render_depth: default_max_render_depth(),
            expr_cache_capacity: default_expr_cache_capacity(),
            legacy_interpolation: default_legacy_interpolation(),
            error_prefix: default_error_prefix(),
        }
    }
}

fn default_max_render_depth() -> usize {
    64
}

fn default_expr_cache_capacity() -> usize {
    256
}

fn default_legacy_interpolation() -> bool {
    true
}

fn default_error_prefix() -> String {
    "render failed".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_object_deserializes_to_defaults() {
        let config: RenderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, RenderConfig::default());
    }

    #[test]
    fn test_partial_override() {
        let config: RenderConfig =
            serde_json::from_str(r#"{"max_render_depth": 8, "legacy_interpolation": false}"#)
                .unwrap();
        assert_eq!(config.max_render_depth, 8);
        assert!(!config.legacy_interpolation);
        assert_eq!(config.expr_cache_capacity, 256);
    }
}
