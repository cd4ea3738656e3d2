//! Value Resolver: reads and reshapes values out of the input record.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

/// Key paths starting with this marker are literal values, not lookups.
pub const LITERAL_MARKER: char = '=';

/// The data record a run fills the form from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record(Value);

impl Record {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Look up `key_path` without converting the result. Missing segments and
    /// walks through non-objects yield `None`.
    pub fn resolve_raw(&self, key_path: &str) -> Option<Value> {
        if key_path.is_empty() {
            return None;
        }
        if let Some(literal) = key_path.strip_prefix(LITERAL_MARKER) {
            return Some(Value::String(literal.to_string()));
        }
        let mut current = &self.0;
        for part in key_path.split('.') {
            current = current.as_object()?.get(part)?;
        }
        Some(current.clone())
    }

    /// Look up `key_path` and render it as text. Absent values render as "".
    pub fn resolve(&self, key_path: &str) -> String {
        self.resolve_raw(key_path)
            .map(|v| stringify(&v))
            .unwrap_or_default()
    }

    /// A copy of this record with `key` set to `value` at the top level.
    pub fn with_field(&self, key: &str, value: impl Into<String>) -> Record {
        let mut map = match &self.0 {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };
        map.insert(key.to_string(), Value::String(value.into()));
        Record(Value::Object(map))
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Record(value)
    }
}

/// Render a raw value as form text.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Object(obj) => platform_reason(obj),
                other => stringify(other),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(_) => value.to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
    }
}

fn platform_reason(obj: &Map<String, Value>) -> String {
    let part = |key: &str| obj.get(key).map(stringify).unwrap_or_default();
    let platform = part("platform");
    let reason = part("reason");
    match (platform.is_empty(), reason.is_empty()) {
        (false, false) => format!("{platform}: {reason}"),
        (false, true) => platform,
        _ => reason,
    }
}

/// Split a raw value into a list of non-empty trimmed entries. Arrays pass
/// through element-wise, text splits on commas and newlines.
pub fn split_list(raw: Option<&Value>) -> Vec<String> {
    match raw {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| stringify(item).trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        Some(other) => stringify(other)
            .split([',', '\n'])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
    }
}

/// Lowercase and strip everything but ASCII letters and digits.
pub fn normalize_text(text: &str) -> String {
    text.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn us_size_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bUS\s*(\d+(?:\.\d+)?)").expect("valid regex"))
}

fn number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid regex"))
}

/// Pull the size token out of free-form size text: `US <n>` wins, then the
/// first number, else the text unchanged.
pub fn extract_us_size(text: &str) -> String {
    if let Some(caps) = us_size_re().captures(text) {
        return caps[1].to_string();
    }
    if let Some(m) = number_re().find(text) {
        return m.as_str().to_string();
    }
    text.to_string()
}

/// Trim entries, drop blanks and nulls, and rejoin with `", "`.
pub fn build_comma_separated_value(raw: Option<&Value>) -> String {
    let entries: Vec<String> = match raw {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(stringify)
            .collect(),
        Some(other) => stringify(other).lines().map(str::to_string).collect(),
    };
    entries
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record() -> Record {
        Record::new(json!({
            "title": "Air Max",
            "price": 120,
            "details": { "size": "US 10.5", "colors": ["Red", "Blue"] },
            "issues": [
                { "platform": "eBay", "reason": "scuffed" },
                { "platform": "Grailed" },
                { "reason": "box missing" }
            ],
            "meta": { "a": 1 }
        }))
    }

    #[test]
    fn absent_segments_resolve_empty() {
        let r = record();
        assert_eq!(r.resolve("missing"), "");
        assert_eq!(r.resolve("details.missing.deeper"), "");
        assert_eq!(r.resolve("title.length"), "");
        assert!(r.resolve_raw("price.value").is_none());
        assert!(r.resolve_raw("").is_none());
    }

    #[test]
    fn literal_key_path_bypasses_record() {
        assert_eq!(record().resolve("=foo"), "foo");
        assert_eq!(Record::default().resolve("=foo"), "foo");
        assert_eq!(record().resolve("="), "");
    }

    #[test]
    fn stringifies_shapes() {
        let r = record();
        assert_eq!(r.resolve("title"), "Air Max");
        assert_eq!(r.resolve("price"), "120");
        assert_eq!(r.resolve("details.colors"), "Red\nBlue");
        assert_eq!(r.resolve("issues"), "eBay: scuffed\nGrailed\nbox missing");
        assert_eq!(r.resolve("meta"), r#"{"a":1}"#);
    }

    #[test]
    fn raw_preserves_shape() {
        assert_eq!(
            record().resolve_raw("details.colors"),
            Some(json!(["Red", "Blue"]))
        );
    }

    #[test]
    fn with_field_returns_new_record() {
        let r = record();
        let patched = r.with_field("sku", "8");
        assert_eq!(patched.resolve("sku"), "8");
        assert_eq!(r.resolve("sku"), "");
    }

    #[test]
    fn comma_join_drops_blank_entries() {
        let raw = json!(["a", "  b ", "", null]);
        assert_eq!(build_comma_separated_value(Some(&raw)), "a, b");
        let text = json!("x\n\n  y  ");
        assert_eq!(build_comma_separated_value(Some(&text)), "x, y");
        assert_eq!(build_comma_separated_value(None), "");
    }

    #[test]
    fn us_size_extraction() {
        assert_eq!(extract_us_size("US 10.5"), "10.5");
        assert_eq!(extract_us_size("EU 44 / US 10"), "10");
        assert_eq!(extract_us_size("42"), "42");
        assert_eq!(extract_us_size("N/A"), "N/A");
    }

    #[test]
    fn split_list_handles_text_and_arrays() {
        assert_eq!(split_list(Some(&json!("a, b\nc,,"))), vec!["a", "b", "c"]);
        assert_eq!(split_list(Some(&json!([" x ", "", "y"]))), vec!["x", "y"]);
        assert!(split_list(None).is_empty());
    }

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize_text("Off-White™ (Co.)"), "offwhiteco");
    }
}
