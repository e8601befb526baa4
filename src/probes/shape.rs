//! Explicit response shapes for validators.
//!
//! Some endpoints answer with an object in one release and an array in
//! another. Validators match on [`JsonShape`] and reject anything they do not
//! name instead of accepting whatever comes back.

use serde_json::{Map, Value};

use super::HttpResponse;

#[derive(Debug, Clone, Copy)]
pub enum JsonShape<'a> {
    Object(&'a Map<String, Value>),
    Array(&'a [Value]),
    Scalar(&'a Value),
}

impl<'a> JsonShape<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => JsonShape::Object(map),
            Value::Array(items) => JsonShape::Array(items),
            other => JsonShape::Scalar(other),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            JsonShape::Object(_) => "object",
            JsonShape::Array(_) => "array",
            JsonShape::Scalar(Value::Null) => "null",
            JsonShape::Scalar(Value::String(_)) => "string",
            JsonShape::Scalar(_) => "scalar",
        }
    }
}

/// Body must be a non-empty JSON array; `what` names the items in the message.
pub fn non_empty_array(resp: &HttpResponse, what: &str) -> Result<String, String> {
    let body = resp.json()?;
    match JsonShape::of(&body) {
        JsonShape::Array(items) if !items.is_empty() => Ok(format!("Found {} {what}", items.len())),
        JsonShape::Array(_) => Err(format!("no {what} returned")),
        other => Err(format!("expected array of {what}, got {}", other.kind())),
    }
}

/// Body must be a JSON object or array; counts keys or items.
pub fn object_or_array(resp: &HttpResponse, what: &str) -> Result<String, String> {
    let body = resp.json()?;
    match JsonShape::of(&body) {
        JsonShape::Object(map) => Ok(format!("Found {} {what}", map.len())),
        JsonShape::Array(items) => Ok(format!("Found {} {what}", items.len())),
        other => Err(format!("expected object or array, got {}", other.kind())),
    }
}

/// Follow `path` through nested objects and return the string found there.
pub fn string_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
}

/// Objects of a newline-delimited JSON stream. Blank and unparseable lines
/// are skipped.
pub fn json_lines(body: &str) -> Vec<Value> {
    body.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect()
}
