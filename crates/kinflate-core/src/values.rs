//! Chart values and the layered merge used to build them

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// A value document (always a mapping at the root once loaded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Values(pub JsonValue);

impl Default for Values {
    fn default() -> Self {
        Self::new()
    }
}

impl Values {
    /// Create empty values
    pub fn new() -> Self {
        Self(JsonValue::Object(serde_json::Map::new()))
    }

    /// Load values from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content).map_err(|e| CoreError::ValuesMerge {
            message: format!("failed to parse {}: {}", path.as_ref().display(), e),
        })
    }

    /// Parse values from a YAML string.
    ///
    /// Empty and comment-only documents yield empty values. Any other
    /// non-mapping document is rejected.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let blank = yaml
            .lines()
            .all(|l| l.trim().is_empty() || l.trim_start().starts_with('#'));
        if blank {
            return Ok(Self::new());
        }

        match serde_yaml::from_str::<JsonValue>(yaml)? {
            JsonValue::Null => Ok(Self::new()),
            v @ JsonValue::Object(_) => Ok(Self(v)),
            other => Err(CoreError::ValuesMerge {
                message: format!("expected a mapping but got {}", type_name(&other)),
            }),
        }
    }

    /// Wrap an already parsed JSON value
    pub fn from_json_value(value: JsonValue) -> Result<Self> {
        match value {
            JsonValue::Null => Ok(Self::new()),
            v @ JsonValue::Object(_) => Ok(Self(v)),
            other => Err(CoreError::ValuesMerge {
                message: format!("expected a mapping but got {}", type_name(&other)),
            }),
        }
    }

    /// Apply `overlay` on top of these values.
    ///
    /// Per key: an absent key is copied, a non-mapping overlay value always
    /// replaces, a mapping replaces a non-mapping, and only two mappings are
    /// merged recursively.
    pub fn merge(&mut self, overlay: &Values) {
        merge_values(&mut self.0, &overlay.0);
    }

    /// Merge `overlays` left to right onto `base`
    pub fn merge_all<'a>(base: Values, overlays: impl IntoIterator<Item = &'a Values>) -> Self {
        let mut result = base;
        for overlay in overlays {
            result.merge(overlay);
        }
        result
    }

    /// Set a value by dotted path (e.g., "image.tag")
    pub fn set(&mut self, path: &str, value: JsonValue) -> Result<()> {
        let parts: Vec<&str> = path.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return Err(CoreError::ValuesMerge {
                message: format!("invalid key path '{}'", path),
            });
        }
        set_nested(&mut self.0, &parts, value);
        Ok(())
    }

    /// Get a value by dotted path
    pub fn get(&self, path: &str) -> Option<&JsonValue> {
        path.split('.')
            .try_fold(&self.0, |current, key| current.as_object()?.get(key))
    }

    pub fn inner(&self) -> &JsonValue {
        &self.0
    }

    pub fn into_inner(self) -> JsonValue {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        match &self.0 {
            JsonValue::Object(map) => map.is_empty(),
            JsonValue::Null => true,
            _ => false,
        }
    }

    /// Serialize as YAML
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(&self.0)?)
    }

    /// Values a subchart sees: its own subtree plus `global`
    pub fn scope_for_subchart(&self, subchart_name: &str) -> Values {
        let mut scoped = serde_json::Map::new();

        if let JsonValue::Object(parent) = &self.0 {
            if let Some(JsonValue::Object(sub)) = parent.get(subchart_name) {
                for (k, v) in sub {
                    scoped.insert(k.clone(), v.clone());
                }
            }
            if let Some(global) = parent.get("global") {
                let mut merged = JsonValue::Object(serde_json::Map::new());
                if let Some(own) = scoped.get("global") {
                    merged = own.clone();
                }
                merge_values(&mut merged, global);
                scoped.insert("global".to_string(), merged);
            }
        }

        Values(JsonValue::Object(scoped))
    }

    /// Resolve subchart values: its defaults overridden by the scoped parent values
    pub fn for_subchart(defaults: &Values, parent: &Values, subchart_name: &str) -> Values {
        let mut result = defaults.clone();
        result.merge(&parent.scope_for_subchart(subchart_name));
        result
    }
}

fn merge_values(dest: &mut JsonValue, src: &JsonValue) {
    match (dest, src) {
        (JsonValue::Object(dest_map), JsonValue::Object(src_map)) => {
            for (key, value) in src_map {
                match dest_map.get_mut(key) {
                    None => {
                        dest_map.insert(key.clone(), value.clone());
                    }
                    Some(existing) if existing.is_object() && value.is_object() => {
                        merge_values(existing, value);
                    }
                    Some(existing) => *existing = value.clone(),
                }
            }
        }
        (dest, src) => *dest = src.clone(),
    }
}

fn set_nested(value: &mut JsonValue, path: &[&str], new_value: JsonValue) {
    let Some((key, remaining)) = path.split_first() else {
        *value = new_value;
        return;
    };

    if !value.is_object() {
        *value = JsonValue::Object(serde_json::Map::new());
    }
    if let JsonValue::Object(map) = value {
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| JsonValue::Object(serde_json::Map::new()));
        set_nested(entry, remaining, new_value);
    }
}

fn type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "a list",
        JsonValue::Object(_) => "a mapping",
    }
}

/// Parse `key=value` overrides into values
pub fn parse_set_values(set_args: &[String]) -> Result<Values> {
    let mut values = Values::new();

    for arg in set_args {
        let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::ValuesMerge {
            message: format!("invalid --set format '{}', expected key=value", arg),
        })?;

        let json_value = match val {
            "true" => JsonValue::Bool(true),
            "false" => JsonValue::Bool(false),
            "null" => JsonValue::Null,
            _ => {
                if let Ok(num) = val.parse::<i64>() {
                    JsonValue::Number(num.into())
                } else if let Some(num) = val
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                {
                    JsonValue::Number(num)
                } else if val.starts_with('[') || val.starts_with('{') {
                    serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
                } else {
                    JsonValue::String(val.to_string())
                }
            }
        };

        values.set(key, json_value)?;
    }

    Ok(values)
}
