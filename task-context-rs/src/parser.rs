//! Decoding of backend context/summaries payloads
//!
//! Backends of different versions answer with slightly different shapes.
//! Entries are read from the first non-empty array among:
//! - top-level `entries`
//! - nested `data.entries`
//!
//! Each record may use `id` or `key` for its identifier and `content`,
//! `text` or `summary` for its body.

use crate::{
    errors::{Result, TaskContextError},
    types::{MemoryEntry, MemorySource},
};
use chrono::{DateTime, NaiveDate};
use serde_json::Value;

/// Parses raw backend output into normalized entries.
///
/// Fails only when `raw` is not valid JSON. Records without a usable key or
/// content are dropped.
pub fn parse_entries(source: MemorySource, raw: &str) -> Result<Vec<MemoryEntry>> {
    let payload: Value = serde_json::from_str(raw)
        .map_err(|error| TaskContextError::InvalidPayload { backend: source, error })?;

    Ok(entry_array(&payload)
        .iter()
        .filter_map(|record| parse_record(source, record))
        .collect())
}

fn entry_array(payload: &Value) -> &[Value] {
    let candidates = [
        payload.get("entries"),
        payload.get("data").and_then(|data| data.get("entries")),
    ];

    candidates
        .into_iter()
        .flatten()
        .filter_map(Value::as_array)
        .find(|entries| !entries.is_empty())
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn parse_record(source: MemorySource, record: &Value) -> Option<MemoryEntry> {
    let key = ["id", "key"]
        .into_iter()
        .find_map(|field| record.get(field).and_then(identifier))?;
    let content = ["content", "text", "summary"]
        .into_iter()
        .filter_map(|field| record.get(field).and_then(Value::as_str))
        .find(|text| !text.trim().is_empty())?;
    let score = record.get("score").and_then(Value::as_f64).unwrap_or(0.0);
    let timestamp = record.get("timestamp").map_or(0, parse_timestamp);

    MemoryEntry::new(&key, content, score, timestamp, source)
}

fn identifier(value: &Value) -> Option<String> {
    match value {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

/// Converts a timestamp field to epoch milliseconds.
///
/// Numbers are taken as milliseconds; strings may be RFC 3339 instants or
/// plain `YYYY-MM-DD` dates. Anything else yields 0.
pub fn parse_timestamp(value: &Value) -> i64 {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|n| n.is_finite()).map(|n| n as i64))
            .unwrap_or(0),
        Value::String(text) => {
            let text = text.trim();
            if let Ok(instant) = DateTime::parse_from_rfc3339(text) {
                return instant.timestamp_millis();
            }
            NaiveDate::parse_from_str(text, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map_or(0, |midnight| midnight.and_utc().timestamp_millis())
        },
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_top_level_entries() {
        let raw = json!({
            "entries": [{"id": "S-1", "content": " note ", "score": 1, "tag": "decision"}]
        })
        .to_string();

        let entries = parse_entries(MemorySource::Serena, &raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "s-1");
        assert_eq!(entries[0].content, "note");
        assert_eq!(entries[0].score, 1.0);
        assert_eq!(entries[0].timestamp, 0);
        assert_eq!(entries[0].source, MemorySource::Serena);
    }

    #[test]
    fn test_nested_entries_used_when_top_level_empty() {
        let raw = json!({
            "entries": [],
            "data": {"entries": [{"key": "Nested  Key", "text": "from data"}]}
        })
        .to_string();

        let entries = parse_entries(MemorySource::Supermemory, &raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "nested key");
        assert_eq!(entries[0].content, "from data");
        assert_eq!(entries[0].source, MemorySource::Supermemory);
    }

    #[test]
    fn test_top_level_wins_over_nested() {
        let raw = json!({
            "entries": [{"id": "top", "content": "a"}],
            "data": {"entries": [{"id": "nested", "content": "b"}]}
        })
        .to_string();

        let entries = parse_entries(MemorySource::Serena, &raw).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].key, "top");
    }

    #[test]
    fn test_content_fallbacks_and_drops() {
        let raw = json!({
            "entries": [
                {"id": "a", "content": "  ", "summary": "from summary"},
                {"id": "b"},
                {"content": "no id"},
                {"id": "   ", "content": "blank id"},
                {"id": 42, "text": "numeric id"},
                "not an object"
            ]
        })
        .to_string();

        let entries = parse_entries(MemorySource::Serena, &raw).unwrap();
        let keys: Vec<_> = entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "42"]);
        assert_eq!(entries[0].content, "from summary");
    }

    #[test]
    fn test_id_takes_precedence_over_key() {
        let raw = json!({"entries": [{"id": "by-id", "key": "by-key", "content": "x"}]}).to_string();
        let entries = parse_entries(MemorySource::Serena, &raw).unwrap();
        assert_eq!(entries[0].key, "by-id");
    }

    #[test]
    fn test_non_numeric_score_defaults_to_zero() {
        let raw = json!({"entries": [{"id": "a", "content": "x", "score": "high"}]}).to_string();
        let entries = parse_entries(MemorySource::Serena, &raw).unwrap();
        assert_eq!(entries[0].score, 0.0);
    }

    #[test]
    fn test_invalid_json_fails() {
        let err = parse_entries(MemorySource::Supermemory, "error").unwrap_err();
        assert!(matches!(
            err,
            TaskContextError::InvalidPayload {
                backend: MemorySource::Supermemory,
                ..
            }
        ));
    }

    #[test]
    fn test_unexpected_shapes_yield_no_entries() {
        assert!(parse_entries(MemorySource::Serena, "{}").unwrap().is_empty());
        assert!(parse_entries(MemorySource::Serena, "[]").unwrap().is_empty());
        assert!(
            parse_entries(MemorySource::Serena, r#"{"entries": {"id": "a"}}"#)
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_parse_timestamp() {
        assert_eq!(parse_timestamp(&json!(1_700_000_000_000_i64)), 1_700_000_000_000);
        assert_eq!(parse_timestamp(&json!("1970-01-01T00:00:01Z")), 1000);
        assert_eq!(parse_timestamp(&json!("1970-01-02")), 86_400_000);
        assert_eq!(parse_timestamp(&json!("yesterday")), 0);
        assert_eq!(parse_timestamp(&json!(null)), 0);
        assert_eq!(parse_timestamp(&json!(12.9)), 12);
    }
}
