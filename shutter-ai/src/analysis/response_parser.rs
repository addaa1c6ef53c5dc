//! Tolerant parsing of free-text model replies
//!
//! Models wrap JSON in prose and code fences, quote numbers, return floats
//! for integer fields and drift between camelCase and snake_case keys. The
//! helpers here locate the JSON object and read fields with validate-or-default
//! semantics; callers decide which missing fields are fatal.

use crate::error::{AnalysisError, PipelineResult};
use serde_json::{Map, Value};

/// Maximum number of entries kept from any list field
pub const MAX_LIST_LEN: usize = 10;

/// Slice from the first `{` to the last `}` (inclusive)
pub fn extract_json_slice(text: &str) -> PipelineResult<&str> {
    let start = text.find('{');
    let end = text.rfind('}');

    match (start, end) {
        (Some(start), Some(end)) if start < end => Ok(&text[start..=end]),
        _ => Err(AnalysisError::ResponseParseFailed(format!(
            "No JSON object in model reply ({} chars)",
            text.chars().count()
        ))),
    }
}

/// Locate and parse the JSON object embedded in `text`
pub fn parse_json_object(text: &str) -> PipelineResult<Map<String, Value>> {
    let slice = extract_json_slice(text)?;
    match serde_json::from_str::<Value>(slice) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AnalysisError::ResponseParseFailed(format!(
            "Expected a JSON object, got {}",
            type_name(&other)
        ))),
        Err(e) => Err(AnalysisError::ResponseParseFailed(format!("Invalid JSON: {}", e))),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// `ruleOfThirds` → `rule_of_thirds`
fn snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Field lookup accepting the camelCase key or its snake_case spelling
pub fn field<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object
        .get(key)
        .or_else(|| object.get(&snake_case(key)))
        .filter(|v| !v.is_null())
}

/// Number, numeric string, or `"18/25"`-style string → f64
pub fn coerce_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let head = s.trim().split('/').next().unwrap_or_default().trim();
            let head = head.trim_end_matches(|c: char| !c.is_ascii_digit());
            head.parse::<f64>().ok()
        }
        _ => None,
    }?;
    number.is_finite().then_some(number)
}

/// Coerce, round, and clamp to `[0, max]`
pub fn bounded_u8(value: Option<&Value>, max: u8) -> Option<u8> {
    let number = coerce_number(value?)?;
    Some(number.round().clamp(0.0, f64::from(max)) as u8)
}

/// Trimmed non-empty string field
pub fn string_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match field(object, key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// List of strings; a lone string counts as a one-element list.
/// Blank entries are dropped and the result is capped at [`MAX_LIST_LEN`].
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    let items: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) => vec![s.trim().to_string()],
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter(|s| !s.is_empty())
        .take(MAX_LIST_LEN)
        .collect()
}
