//! Template rendering context

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Result;
use crate::values::{Values, parse_variables};

/// Context available to a template evaluation
///
/// Built once per render call and never mutated afterwards; nested
/// renders derive a fresh context with [`TemplateContext::nested`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateContext {
    /// Merged values (config first, then variables)
    pub values: JsonValue,
}

impl TemplateContext {
    /// Build the top-level context
    ///
    /// Merge order: configuration tree, then variables in the order given.
    /// Variables always win over configuration at the same path.
    pub fn build<S: AsRef<str>>(config: Values, variables: &[S]) -> Result<Self> {
        let vars = parse_variables(variables)?;
        let mut merged = if config.inner().is_null() {
            Values::new()
        } else {
            config
        };
        merged.merge(&vars);

        Ok(Self {
            values: merged.into_inner(),
        })
    }

    /// Wrap an already merged tree
    pub fn from_values(values: Values) -> Self {
        Self {
            values: values.into_inner(),
        }
    }

    /// Derive the context for a nested render
    ///
    /// Starts from a copy of this context and merges `overrides` on top.
    /// A null override leaves the copy untouched.
    pub fn nested(&self, overrides: &JsonValue) -> Self {
        let mut derived = Values(self.values.clone());
        if !overrides.is_null() {
            derived.merge(&Values(overrides.clone()));
        }
        Self {
            values: derived.into_inner(),
        }
    }

    /// Look a value up by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.').try_fold(&self.values, |current, key| match current {
            JsonValue::Object(map) => map.get(key),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use serde_json::json;

    #[test]
    fn test_variables_override_config() {
        let config = Values::from_yaml("a: 1\nb:\n  c: keep\n").unwrap();
        let ctx = TemplateContext::build(config, &["a=2", "b.d=new"]).unwrap();

        assert_eq!(ctx.get("a").unwrap(), "2");
        assert_eq!(ctx.get("b.c").unwrap(), "keep");
        assert_eq!(ctx.get("b.d").unwrap(), "new");
    }

    #[test]
    fn test_variable_replaces_config_mapping() {
        let config = Values::from_yaml("a:\n  b: 1\n").unwrap();
        let ctx = TemplateContext::build(config, &["a=flat"]).unwrap();
        assert_eq!(ctx.get("a").unwrap(), "flat");
    }

    #[test]
    fn test_conflicting_variables_fail() {
        let err = TemplateContext::build(Values::new(), &["a=scalar", "a.b=1"]).unwrap_err();
        assert!(matches!(err, CoreError::MergeConflict { .. }));
    }

    #[test]
    fn test_malformed_variable_fails() {
        let err = TemplateContext::build(Values::new(), &["oops"]).unwrap_err();
        assert!(matches!(err, CoreError::MalformedVariable { .. }));
    }

    #[test]
    fn test_empty_inputs() {
        let ctx = TemplateContext::build(Values(JsonValue::Null), &[] as &[&str]).unwrap();
        assert_eq!(ctx.values, json!({}));
    }

    #[test]
    fn test_nested_does_not_touch_parent() {
        let parent = TemplateContext::from_values(Values(json!({
            "x": "outer",
            "keep": {"a": 1},
        })));
        let child = parent.nested(&json!({"x": "other", "keep": {"b": 2}}));

        assert_eq!(child.get("x").unwrap(), "other");
        assert_eq!(child.get("keep.a").unwrap(), 1);
        assert_eq!(child.get("keep.b").unwrap(), 2);

        assert_eq!(parent.get("x").unwrap(), "outer");
        assert!(parent.get("keep.b").is_none());
    }

    #[test]
    fn test_nested_null_override() {
        let parent = TemplateContext::from_values(Values(json!({"x": 1})));
        assert_eq!(parent.nested(&JsonValue::Null), parent);
    }

    #[test]
    fn test_serializes_as_plain_tree() {
        let ctx = TemplateContext::build(Values::new(), &["b.c=2", "a=1"]).unwrap();
        insta::assert_snapshot!(serde_json::to_string(&ctx).unwrap(), @r#"{"a":"1","b":{"c":"2"}}"#);
    }
}
