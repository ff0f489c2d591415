//! Reduce raw tool results to typed fields.
//!
//! Tool endpoints return the same data in several shapes: a JSON string, an
//! envelope whose `content[0].text` holds base64-encoded JSON (or plain JSON
//! text), or the object itself. Inside that, the entity may sit under
//! `data.<entity>`, under `<entity>`, or at the top level.

use crate::executor::ToolExecutionResult;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tracing::debug;

/// Largest magnitude at which every integer is exactly representable as f64.
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExtractedFields {
    pub view_count: i64,
    pub like_count: i64,
    pub comment_count: i64,
    pub title: String,
    pub description: String,
    pub author: String,
}

impl ExtractedFields {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Unwrap a raw tool result down to its JSON payload.
pub fn extract_payload(raw: &serde_json::Value) -> Option<serde_json::Value> {
    let outer = match raw {
        serde_json::Value::String(s) => serde_json::from_str(s).ok()?,
        other => other.clone(),
    };

    let text = outer
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(|t| t.as_str());

    match text {
        Some(text) => decode_text(text),
        None => Some(outer),
    }
}

/// Envelope text: base64 JSON first, then plain JSON.
fn decode_text(text: &str) -> Option<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(bytes) = STANDARD.decode(trimmed) {
        if let Ok(value) = serde_json::from_slice(&bytes) {
            return Some(value);
        }
    }
    serde_json::from_str(trimmed).ok()
}

/// The object holding the entity's fields: `data.<entity>`, `<entity>`, or
/// the payload itself.
fn entity_object<'a>(payload: &'a serde_json::Value, entity: &str) -> &'a serde_json::Value {
    if let Some(found) = payload
        .get("data")
        .and_then(|d| d.get(entity))
        .filter(|v| v.is_object())
    {
        return found;
    }
    if let Some(found) = payload.get(entity).filter(|v| v.is_object()) {
        return found;
    }
    payload
}

/// Merge the fields of every successful result. Later results override
/// earlier ones for the fields they carry.
pub fn extract_fields(results: &[ToolExecutionResult], entity: &str) -> ExtractedFields {
    let mut fields = ExtractedFields::default();

    for result in results {
        let Some(raw) = &result.raw_result else {
            continue;
        };
        let Some(payload) = extract_payload(raw) else {
            debug!(tool = %result.tool_name, "Tool result has no decodable payload");
            continue;
        };
        let object = entity_object(&payload, entity);

        if let Some(n) = object.get("view_count").and_then(coerce_i64) {
            fields.view_count = n;
        }
        if let Some(n) = object.get("like_count").and_then(coerce_i64) {
            fields.like_count = n;
        }
        if let Some(n) = object.get("comment_count").and_then(coerce_i64) {
            fields.comment_count = n;
        }
        if let Some(s) = object.get("title").and_then(coerce_string) {
            fields.title = s;
        }
        if let Some(s) = object.get("description").and_then(coerce_string) {
            fields.description = s;
        }
        if let Some(s) = object.get("author").and_then(author_name) {
            fields.author = s;
        }
    }

    fields
}

/// Any JSON number, or a numeric string, as `i64`.
///
/// Integers are taken as-is. Floats are truncated toward zero and are exact
/// within ±2^53.
pub fn coerce_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().and_then(|u| i64::try_from(u).ok()))
            .or_else(|| n.as_f64().and_then(float_to_i64)),
        serde_json::Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(float_to_i64))
        }
        _ => None,
    }
}

fn float_to_i64(f: f64) -> Option<i64> {
    (f.is_finite() && f.abs() <= MAX_EXACT_FLOAT_INT).then_some(f.trunc() as i64)
}

fn coerce_string(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// `author` is either a name or an object with `username` / `name`.
fn author_name(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Object(map) => map
            .get("username")
            .or_else(|| map.get("name"))
            .and_then(coerce_string),
        other => coerce_string(other),
    }
}
