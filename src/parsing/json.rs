//! JSON extraction from model output.
//!
//! Even with a JSON response format requested, models wrap objects in code
//! fences or surround them with prose. [`extract_json`] finds the payload and
//! [`FieldReader`] reads fields leniently: absent, null or mistyped fields
//! yield the caller's default instead of an error.

use serde_json::Value;

/// A JSON object.
pub type JsonObject = serde_json::Map<String, Value>;

/// Locates the JSON payload inside a model response.
///
/// Handles, in order:
/// - ```` ```json ```` fenced blocks
/// - plain ```` ``` ```` fenced blocks
/// - raw objects or arrays embedded in prose (whichever opens first)
///
/// Returns the trimmed response when nothing JSON-like is found.
#[must_use]
pub fn extract_json(response: &str) -> &str {
    let trimmed = response.trim();

    if let Some(start) = trimmed.find("```json") {
        let json_start = start + 7;
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    if let Some(start) = trimmed.find("```") {
        let content_start = start + 3;
        let after_marker = &trimmed[content_start..];
        // Skip a language tag such as "JSON\n"
        let json_start = after_marker
            .find(['{', '['])
            .map_or(content_start, |pos| content_start + pos);
        if let Some(end) = trimmed[json_start..].find("```") {
            return trimmed[json_start..json_start + end].trim();
        }
    }

    let object = trimmed.find('{');
    let array = trimmed.find('[');
    let (open, close) = match (object, array) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return trimmed,
    };

    trimmed
        .rfind(close)
        .filter(|end| *end > open)
        .map_or(trimmed, |end| &trimmed[open..=end])
}

/// Parses the JSON payload of a response into a value.
///
/// # Errors
///
/// Returns a description of the parse failure.
pub fn parse_value(response: &str) -> Result<Value, String> {
    let payload = extract_json(response);
    if payload.is_empty() {
        return Err("response was empty".to_string());
    }
    serde_json::from_str(payload).map_err(|e| format!("response was not valid JSON: {e}"))
}

/// Parses the JSON payload of a response into an object.
///
/// # Errors
///
/// Returns a description of the failure if the payload is not valid JSON or
/// not an object.
pub fn parse_object(response: &str) -> Result<JsonObject, String> {
    match parse_value(response)? {
        Value::Object(map) => Ok(map),
        other => Err(format!("expected a JSON object, found {}", kind(&other))),
    }
}

/// Lenient accessor over a JSON object.
///
/// Every getter takes a list of field names and uses the first that is present
/// and not null, so camelCase and snake_case spellings can share one call.
#[derive(Debug, Clone, Copy)]
pub struct FieldReader<'a> {
    object: &'a JsonObject,
}

impl<'a> FieldReader<'a> {
    /// Wraps an object.
    #[must_use]
    pub const fn new(object: &'a JsonObject) -> Self {
        Self { object }
    }

    /// Returns the first present, non-null field among `names`.
    #[must_use]
    pub fn get(&self, names: &[&str]) -> Option<&'a Value> {
        names
            .iter()
            .filter_map(|name| self.object.get(*name))
            .find(|v| !v.is_null())
    }

    /// Returns a string field, or an empty string.
    ///
    /// Numbers and booleans are rendered as text.
    #[must_use]
    pub fn string(&self, names: &[&str]) -> String {
        self.get(names).map(scalar_text).unwrap_or_default()
    }

    /// Returns a non-empty trimmed string field.
    #[must_use]
    pub fn opt_string(&self, names: &[&str]) -> Option<String> {
        let text = self.string(names);
        let trimmed = text.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Returns a numeric field clamped to `[min, max]`, or `default`.
    ///
    /// Numeric strings such as `"0.8"` are accepted.
    #[must_use]
    pub fn number_clamped(&self, names: &[&str], min: f64, max: f64, default: f64) -> f64 {
        let number = match self.get(names) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        number
            .filter(|n| n.is_finite())
            .map_or(default, |n| n.clamp(min, max))
    }

    /// Returns a list of non-empty strings.
    ///
    /// A single string is treated as a one-element list; non-scalar elements
    /// are skipped.
    #[must_use]
    pub fn string_list(&self, names: &[&str]) -> Vec<String> {
        match self.get(names) {
            Some(Value::Array(items)) => items
                .iter()
                .filter(|v| !v.is_array() && !v.is_object() && !v.is_null())
                .map(scalar_text)
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
            _ => Vec::new(),
        }
    }

    /// Returns a reader over a nested object field.
    #[must_use]
    pub fn object(&self, names: &[&str]) -> Option<Self> {
        self.get(names).and_then(Value::as_object).map(Self::new)
    }

    /// Returns the elements of an array field.
    #[must_use]
    pub fn array(&self, names: &[&str]) -> &'a [Value] {
        self.get(names)
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

const fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
