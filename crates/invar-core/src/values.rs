//! Variable maps and the dynamically-typed value tree
//!
//! Every variable in an inventory is a `serde_json::Value`: string, number,
//! boolean, sequence or mapping. Documents that do not decode to a mapping are
//! rejected when they are parsed, so the rest of the pipeline only ever sees
//! [`VarMap`]s.

use serde_json::Value as JsonValue;
use std::path::Path;

use crate::error::{CoreError, Result};

/// A flat mapping from variable name to value
pub type VarMap = serde_json::Map<String, JsonValue>;

/// Parse a YAML document into a variable map
///
/// An empty document yields an empty map.
pub fn from_yaml(content: &str, origin: &Path) -> Result<VarMap> {
    if content.trim().is_empty() {
        return Ok(VarMap::new());
    }
    let value: JsonValue = serde_yaml::from_str(content)?;
    into_map(value, origin)
}

/// Parse a JSON document into a variable map
pub fn from_json(content: &str, origin: &Path) -> Result<VarMap> {
    if content.trim().is_empty() {
        return Ok(VarMap::new());
    }
    let value: JsonValue = serde_json::from_str(content)?;
    into_map(value, origin)
}

fn into_map(value: JsonValue, origin: &Path) -> Result<VarMap> {
    match value {
        JsonValue::Object(map) => Ok(map),
        JsonValue::Null => Ok(VarMap::new()),
        other => Err(CoreError::NotAMapping {
            path: origin.to_path_buf(),
            found: kind_name(&other).to_string(),
        }),
    }
}

/// Overlay `src` onto `dst`, replacing values on key collision
///
/// This is a shallow merge: a mapping in `src` replaces the whole mapping
/// stored under the same key in `dst`.
pub fn overlay(dst: &mut VarMap, src: &VarMap) {
    for (key, value) in src {
        dst.insert(key.clone(), value.clone());
    }
}

/// Get a value by dotted path (e.g. "container_defaults.mem")
pub fn get_path<'a>(vars: &'a VarMap, path: &str) -> Option<&'a JsonValue> {
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut current = vars.get(first)?;
    for part in parts {
        current = match current {
            JsonValue::Object(map) => map.get(part)?,
            JsonValue::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn kind_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "sequence",
        JsonValue::Object(_) => "mapping",
    }
}

/// Coercions used by the cascade and the renderers
pub trait ValueExt {
    /// Render the value the way it would be printed in a template
    fn coerce_string(&self) -> String;

    /// Interpret the value as a flag ("true", "yes", "on", "1", non-zero numbers)
    fn coerce_bool(&self) -> bool;

    /// Normalize a resource quantity; `None` when the type is not recognized
    fn coerce_quantity(&self) -> Option<String>;

    /// Absent, null, numeric zero, empty string or empty collection
    fn is_zero(&self) -> bool;
}

impl ValueExt for JsonValue {
    fn coerce_string(&self) -> String {
        match self {
            JsonValue::Null => String::new(),
            JsonValue::String(s) => s.clone(),
            JsonValue::Bool(b) => b.to_string(),
            JsonValue::Number(n) => n.to_string(),
            other => other.to_string(),
        }
    }

    fn coerce_bool(&self) -> bool {
        match self {
            JsonValue::Bool(b) => *b,
            JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
            JsonValue::String(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "true" | "yes" | "on" | "1"
            ),
            _ => false,
        }
    }

    fn coerce_quantity(&self) -> Option<String> {
        match self {
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(i.to_string())
                } else {
                    n.as_f64().map(|f| {
                        let s = f.to_string();
                        s.strip_suffix(".0").map(str::to_string).unwrap_or(s)
                    })
                }
            }
            JsonValue::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }

    fn is_zero(&self) -> bool {
        match self {
            JsonValue::Null => true,
            JsonValue::Bool(b) => !b,
            JsonValue::Number(n) => n.as_f64().is_some_and(|f| f == 0.0),
            JsonValue::String(s) => s.is_empty(),
            JsonValue::Array(items) => items.is_empty(),
            JsonValue::Object(map) => map.is_empty(),
        }
    }
}

/// Parse a scalar from the command line into a typed value
fn parse_scalar(val: &str) -> JsonValue {
    if val == "true" {
        JsonValue::Bool(true)
    } else if val == "false" {
        JsonValue::Bool(false)
    } else if val == "null" {
        JsonValue::Null
    } else if let Ok(num) = val.parse::<i64>() {
        JsonValue::Number(num.into())
    } else if let Ok(num) = val.parse::<f64>() {
        serde_json::Number::from_f64(num)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(val.to_string()))
    } else if val.starts_with('[') || val.starts_with('{') {
        serde_json::from_str(val).unwrap_or_else(|_| JsonValue::String(val.to_string()))
    } else {
        JsonValue::String(val.to_string())
    }
}

/// Parse `--extra-vars` arguments
///
/// Each argument is one of:
/// - `key=value`: a single variable (value typed like a YAML scalar)
/// - `@path`: a YAML or JSON file holding a mapping
/// - an inline YAML/JSON mapping such as `{"replicas": 3}`
pub fn parse_extra_vars(args: &[String], working_dir: &Path) -> Result<VarMap> {
    let mut vars = VarMap::new();

    for arg in args {
        let arg = arg.trim();
        if let Some(file) = arg.strip_prefix('@') {
            let path = working_dir.join(file);
            let content = std::fs::read_to_string(&path).map_err(|e| CoreError::InvalidExtraVar {
                arg: arg.to_string(),
                message: format!("cannot read {}: {}", path.display(), e),
            })?;
            let parsed = if file.ends_with(".json") {
                from_json(&content, &path)?
            } else {
                from_yaml(&content, &path)?
            };
            overlay(&mut vars, &parsed);
        } else if arg.starts_with('{') {
            let parsed = from_yaml(arg, Path::new("<extra-vars>"))?;
            overlay(&mut vars, &parsed);
        } else {
            let (key, val) = arg.split_once('=').ok_or_else(|| CoreError::InvalidExtraVar {
                arg: arg.to_string(),
                message: "expected key=value, @file or a mapping".to_string(),
            })?;
            if key.is_empty() {
                return Err(CoreError::InvalidExtraVar {
                    arg: arg.to_string(),
                    message: "empty variable name".to_string(),
                });
            }
            vars.insert(key.to_string(), parse_scalar(val));
        }
    }

    Ok(vars)
}
