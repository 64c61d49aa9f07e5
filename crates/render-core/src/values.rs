//! Values handling with deep merge support

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{CoreError, Result};

/// Values container with deep merge capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Parse a configuration document from YAML
    ///
    /// An empty document (or one holding only comments) yields an empty
    /// mapping. Any other non-mapping document is rejected.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::new());
        }
        let value: JsonValue = serde_yaml::from_str(yaml)?;
        Self::from_mapping(value)
    }

    /// Parse a configuration document from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(json)?;
        Self::from_mapping(value)
    }

    fn from_mapping(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            JsonValue::Object(_) => Ok(Self(value)),
            other => Err(CoreError::NotAMapping {
                found: kind_name(&other),
            }),
        }
    }

    /// Deep merge another Values into this one
    ///
    /// Rules:
    /// - Scalars: overlay replaces base
    /// - Objects: recursive merge
    /// - Arrays: overlay replaces base (not appended)
    /// - Mismatched kinds: overlay replaces base wholesale
    pub fn merge(&mut self, overlay: &Values) {
        deep_merge(&mut self.0, &overlay.0);
    }

    /// Merge multiple values in order, later entries win
    pub fn merge_all(values: impl IntoIterator<Item = Values>) -> Self {
        let mut result = Values::new();
        for v in values {
            result.merge(&v);
        }
        result
    }

    /// Set a value by dotted path (e.g., "image.tag")
    ///
    /// Intermediate mappings are created as needed. Walking through an
    /// existing scalar or sequence is a `MergeConflict`.
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        set_nested(&mut self.0, &parts, 0, value)
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        let parts: Vec<&str> = path.split('.').collect();
        get_nested(&self.0, &parts)
    }

    /// Get the inner JSON value
    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    /// Convert to JSON value
    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    /// Check if values are empty
    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }
}

impl From<JsonValue> for Values {
    fn from(value: JsonValue) -> Self {
        Self(value)
    }
}

/// Deep merge two JSON values
fn deep_merge(base: &mut JsonValue, overlay: &JsonValue) {
    match (base, overlay) {
        (JsonValue::Object(base_map), JsonValue::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => {
                        base_map.insert(key.clone(), overlay_value.clone());
                    }
                }
            }
        }
        (base, overlay) => {
            *base = overlay.clone();
        }
    }
}

/// Set a nested value by path
fn set_nested(value: &mut JsonValue, path: &[&str], depth: usize, new_value: JsonValue) -> Result<()> {
    if value.is_null() {
        *value = JsonValue::Object(serde_json::Map::new());
    }

    let JsonValue::Object(map) = value else {
        return Err(CoreError::MergeConflict {
            path: path.join("."),
            blocked_at: path[..depth].join("."),
            found: kind_name(value),
        });
    };

    let key = path[depth];
    if depth + 1 == path.len() {
        map.insert(key.to_string(), new_value);
        return Ok(());
    }

    let entry = map
        .entry(key.to_string())
        .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
    set_nested(entry, path, depth + 1, new_value)
}

/// Get a nested value by path
fn get_nested<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a JsonValue> {
    let Some((key, remaining)) = path.split_first() else {
        return Some(value);
    };

    match value {
        JsonValue::Object(map) => map.get(*key).and_then(|v| get_nested(v, remaining)),
        _ => None,
    }
}

pub(crate) fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "mapping",
    }
}

/// A single `path=value` variable from the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    /// Dotted path, already validated
    pub path: String,
    /// Value with one layer of matching quotes removed
    pub value: String,
}

/// Parse a `path=value` string
///
/// The input is split on the first `=`. Values are always strings; a
/// single layer of surrounding `"…"` or `'…'` is stripped so that values
/// with spaces survive shell quoting.
pub fn parse_variable(input: &str) -> Result<Variable> {
    let malformed = |reason: &str| CoreError::MalformedVariable {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let (path, raw) = input
        .split_once('=')
        .ok_or_else(|| malformed("expected path=value"))?;

    if path.is_empty() {
        return Err(malformed("path is empty"));
    }
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(malformed("path has an empty segment"));
        }
        if !segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(malformed(&format!("invalid path segment '{segment}'")));
        }
    }

    Ok(Variable {
        path: path.to_string(),
        value: strip_quotes(raw).to_string(),
    })
}

/// Parse every variable and build them into one tree, in order
///
/// Later entries overwrite earlier ones at the same path.
pub fn parse_variables<S: AsRef<str>>(inputs: &[S]) -> Result<Values> {
    let mut values = Values::new();
    for input in inputs {
        let var = parse_variable(input.as_ref())?;
        tracing::debug!(path = %var.path, "applying variable");
        values.set(&var.path, JsonValue::String(var.value))?;
    }
    Ok(values)
}

fn strip_quotes(raw: &str) -> &str {
    let bytes = raw.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}
