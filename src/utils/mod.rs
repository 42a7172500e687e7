//! Common utilities and helper functions
//!
//! Most of this module is about reading loosely-typed backend payloads:
//! every numeric field may arrive as a number, a numeric string, a
//! formatted duration or not at all. The `de_*` functions are meant for
//! `#[serde(deserialize_with = ...)]` and never fail; they fall back to the
//! type's empty value instead.

pub mod clock;
pub mod error;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::sync::OnceLock;

/// Extract the first digit run of a quality label ("1080p60" -> 1080)
pub fn quality_number(label: &str) -> Option<u32> {
    static DIGITS_RE: OnceLock<Regex> = OnceLock::new();

    let re = DIGITS_RE.get_or_init(|| Regex::new(r"\d+").expect("Invalid regex pattern"));

    re.find(label).and_then(|m| m.as_str().parse().ok())
}

/// Parse a duration given as seconds ("125") or clock text ("2:05", "1:02:05")
pub fn parse_duration_text(text: &str) -> u64 {
    let text = text.trim();
    if text.is_empty() {
        return 0;
    }

    if let Ok(secs) = text.parse::<f64>() {
        return if secs.is_finite() && secs > 0.0 { secs as u64 } else { 0 };
    }

    let mut total: u64 = 0;
    for part in text.split(':') {
        match part.trim().parse::<u64>() {
            Ok(value) => total = total.saturating_mul(60).saturating_add(value),
            Err(_) => return 0,
        }
    }
    total
}

/// Convert an arbitrary JSON value to an unsigned count
pub fn value_to_u64(value: &Value) -> u64 {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !matches!(c, ',' | '_')).collect();
            parse_duration_text(&cleaned)
        }
        Value::Bool(b) => u64::from(*b),
        _ => 0,
    }
}

/// Convert an arbitrary JSON value to text
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// Lenient unsigned integer: numbers, numeric strings, clock text, null -> 0
pub fn de_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(value_to_u64).unwrap_or(0))
}

/// Lenient u32 (frame rates and similar small counts)
pub fn de_u32<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = de_u64(deserializer)?;
    Ok(u32::try_from(value).unwrap_or(u32::MAX))
}

/// Lenient optional timestamp: absent, null or zero -> None
pub fn de_opt_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value
        .as_ref()
        .and_then(|v| match v {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
        .filter(|ts| *ts != 0))
}

/// Lenient string: numbers are stringified, null -> ""
pub fn de_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().map(value_to_string).unwrap_or_default())
}

/// Lenient optional string: null or empty -> None
pub fn de_opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = de_string(deserializer)?;
    Ok(Some(value).filter(|s| !s.is_empty()))
}

/// Lenient boolean: null -> false, "true"/1 -> true
pub fn de_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_u64().unwrap_or(0) != 0,
        Some(Value::String(s)) => matches!(s.to_lowercase().as_str(), "true" | "1" | "yes"),
        _ => false,
    })
}

/// Lenient sequence: null or a non-array value -> empty
pub fn de_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: serde::de::DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Whether an id can be placed in a request path or worker argument
pub fn is_valid_content_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 64
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Strip a known prefix from an id-carrying path ("/watch?v=abc" -> "abc")
pub fn strip_id_prefix<'a>(value: &'a str, prefixes: &[&str]) -> &'a str {
    prefixes
        .iter()
        .find_map(|prefix| value.strip_prefix(prefix))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(default, deserialize_with = "de_u64")]
        duration: u64,
        #[serde(default, deserialize_with = "de_string")]
        title: String,
        #[serde(default, deserialize_with = "de_opt_i64")]
        published: Option<i64>,
        #[serde(default, deserialize_with = "de_bool")]
        pinned: bool,
        #[serde(default, deserialize_with = "de_vec")]
        tags: Vec<String>,
    }

    #[test]
    fn test_quality_number() {
        assert_eq!(quality_number("1080p"), Some(1080));
        assert_eq!(quality_number("720p60"), Some(720));
        assert_eq!(quality_number("hd 1440p"), Some(1440));
        assert_eq!(quality_number("high"), None);
        assert_eq!(quality_number(""), None);
    }

    #[test]
    fn test_parse_duration_text() {
        assert_eq!(parse_duration_text("125"), 125);
        assert_eq!(parse_duration_text("2:05"), 125);
        assert_eq!(parse_duration_text("1:02:05"), 3725);
        assert_eq!(parse_duration_text("12.7"), 12);
        assert_eq!(parse_duration_text("live"), 0);
        assert_eq!(parse_duration_text(""), 0);
    }

    #[test]
    fn test_lenient_fields() {
        let sample: Sample = serde_json::from_value(json!({
            "duration": "3:10",
            "title": 42,
            "published": "1700000000",
            "pinned": 1,
            "tags": ["a", 3, "b"]
        }))
        .unwrap();

        assert_eq!(sample.duration, 190);
        assert_eq!(sample.title, "42");
        assert_eq!(sample.published, Some(1_700_000_000));
        assert!(sample.pinned);
        assert_eq!(sample.tags, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_lenient_fields_missing_or_null() {
        let sample: Sample = serde_json::from_value(json!({
            "duration": null,
            "title": null,
            "tags": {"not": "a list"}
        }))
        .unwrap();

        assert_eq!(sample.duration, 0);
        assert_eq!(sample.title, "");
        assert_eq!(sample.published, None);
        assert!(!sample.pinned);
        assert!(sample.tags.is_empty());
    }

    #[test]
    fn test_value_to_u64_with_separators() {
        assert_eq!(value_to_u64(&json!("1,234,567")), 1_234_567);
        assert_eq!(value_to_u64(&json!(12.9)), 12);
        assert_eq!(value_to_u64(&json!(-4)), 0);
    }

    #[test]
    fn test_strip_id_prefix() {
        assert_eq!(strip_id_prefix("/watch?v=abc", &["/watch?v="]), "abc");
        assert_eq!(strip_id_prefix("/channel/UC1", &["/channel/"]), "UC1");
        assert_eq!(strip_id_prefix("plain", &["/watch?v="]), "plain");
    }
}
