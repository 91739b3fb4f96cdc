//! Ansible-flavoured template filters
//!
//! These filters extend MiniJinja's builtins with the ones inventories commonly use.

use base64::Engine as _;
use minijinja::{Error, ErrorKind, Value, value::ValueKind};

/// Filters registered on top of the builtins
pub const FILTER_NAMES: &[&str] = &[
    "basename",
    "dirname",
    "to_yaml",
    "to_json",
    "b64encode",
    "b64decode",
    "quote",
    "bool",
    "regex_replace",
    "mandatory",
];

fn is_missing(value: &Value) -> bool {
    value.is_undefined() || value.is_none()
}

/// Last component of a path
///
/// Usage: {{ config_path | basename }}
///
/// A missing input yields the filter argument instead.
pub fn basename(value: Value, fallback: Option<Value>) -> Value {
    if is_missing(&value) {
        return fallback.unwrap_or(value);
    }
    Value::from(path_base(&value.to_string()))
}

/// Everything but the last component of a path
///
/// Usage: {{ config_path | dirname }}
pub fn dirname(value: Value, fallback: Option<Value>) -> Value {
    if is_missing(&value) {
        return fallback.unwrap_or(value);
    }
    Value::from(path_dir(&value.to_string()))
}

fn path_base(path: &str) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        return "/".to_string();
    }
    trimmed.rsplit('/').next().unwrap_or(trimmed).to_string()
}

fn path_dir(path: &str) -> String {
    match path.rfind('/') {
        None => ".".to_string(),
        Some(pos) => {
            let dir = path[..pos].trim_end_matches('/');
            if dir.is_empty() {
                "/".to_string()
            } else {
                dir.to_string()
            }
        }
    }
}

/// Convert a value to YAML
///
/// Usage: {{ container_defaults | to_yaml }}
pub fn to_yaml(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    let yaml = serde_yaml::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    Ok(yaml.trim_start_matches("---\n").trim_end().to_string())
}

/// Convert a value to JSON
///
/// Usage: {{ labels | to_json }}
pub fn to_json(value: Value) -> Result<String, Error> {
    let json_value: serde_json::Value = serde_json::to_value(&value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))?;

    serde_json::to_string(&json_value)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, e.to_string()))
}

/// Base64 encode a string
#[must_use]
pub fn b64encode(value: String) -> String {
    base64::engine::general_purpose::STANDARD.encode(value.as_bytes())
}

/// Base64 decode a string
pub fn b64decode(value: String) -> Result<String, Error> {
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(value.trim().as_bytes())
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("base64 decode error: {}", e)))?;

    String::from_utf8(decoded)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("UTF-8 decode error: {}", e)))
}

/// Quote a value for use in a shell command
///
/// Usage: {{ password | quote }}
#[must_use]
pub fn quote(value: Value) -> String {
    let s = value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string());
    let safe = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        s
    } else {
        format!("'{}'", s.replace('\'', "'\"'\"'"))
    }
}

/// Interpret a value as a boolean ("yes", "on", "true", "1", non-zero numbers)
pub fn bool(value: Value) -> bool {
    match value.kind() {
        ValueKind::Bool => value.is_true(),
        ValueKind::Number => value.is_true(),
        ValueKind::String => matches!(
            value.as_str().unwrap_or_default().trim().to_ascii_lowercase().as_str(),
            "yes" | "on" | "true" | "1"
        ),
        _ => false,
    }
}

/// Replace regex matches; `\1` style back-references are accepted
///
/// Usage: {{ image | regex_replace(':.*$', '') }}
pub fn regex_replace(value: String, pattern: String, replacement: Option<String>) -> Result<String, Error> {
    let re = regex::Regex::new(&pattern)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("invalid regex: {}", e)))?;
    let replacement = BACKREF_RE.replace_all(replacement.as_deref().unwrap_or_default(), "$${$1}");
    Ok(re.replace_all(&value, &*replacement).into_owned())
}

static BACKREF_RE: once_cell::sync::Lazy<regex::Regex> =
    once_cell::sync::Lazy::new(|| regex::Regex::new(r"\\(\d+)").expect("valid regex"));

/// Fail when the value is undefined
///
/// Usage: {{ db_password | mandatory }}
pub fn mandatory(value: Value, message: Option<String>) -> Result<Value, Error> {
    if is_missing(&value) {
        let msg = message.unwrap_or_else(|| "mandatory variable is not defined".to_string());
        Err(Error::new(ErrorKind::UndefinedError, msg))
    } else {
        Ok(value)
    }
}
