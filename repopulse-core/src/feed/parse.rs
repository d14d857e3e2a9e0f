//! Classification of raw feed payloads into [`FeedMessage`]s.
//!
//! A payload is either a JSON array of message objects or a single object.
//! Each object is classified by the keys it carries:
//!
//! | Keys present | Message |
//! |--------------|---------|
//! | `timestamp` | [`FeedMessage::Activity`], every other key is a per-kind count |
//! | `createdAt` or `closedAt` | [`FeedMessage::Duration`] |
//! | anything else | [`FeedMessage::CategoryCount`], `count` defaults to 1 |
//!
//! A single malformed element rejects the whole batch.

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::error::FeedError;
use crate::types::{
    ActivitySample, CategoryCount, DurationEvent, EventKind, FeedMessage, UNKNOWN_CATEGORY,
};

const TIMESTAMP_KEY: &str = "timestamp";
const CREATED_AT_KEY: &str = "createdAt";
const CLOSED_AT_KEY: &str = "closedAt";
const COUNT_KEYS: [&str; 2] = ["count", "totalCount"];

/// Parse a raw payload (as received from the transport).
pub fn parse_batch(payload: &str, category_key: &str) -> Result<Vec<FeedMessage>, FeedError> {
    let value: Value = serde_json::from_str(payload)
        .map_err(|e| FeedError::parse(format!("invalid JSON: {}", e)))?;
    parse_value(&value, category_key)
}

/// Parse an already-decoded payload.
pub fn parse_value(value: &Value, category_key: &str) -> Result<Vec<FeedMessage>, FeedError> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                parse_message(item, category_key).map_err(|e| match e {
                    FeedError::Parse { message } => {
                        FeedError::parse(format!("element {}: {}", i, message))
                    }
                    other => other,
                })
            })
            .collect(),
        Value::Object(_) => Ok(vec![parse_message(value, category_key)?]),
        other => Err(FeedError::parse(format!(
            "expected array or object, got {}",
            json_type_name(other)
        ))),
    }
}

/// Classify one message object.
pub fn parse_message(value: &Value, category_key: &str) -> Result<FeedMessage, FeedError> {
    let obj = value.as_object().ok_or_else(|| {
        FeedError::parse(format!("expected object, got {}", json_type_name(value)))
    })?;

    if let Some(timestamp) = obj.get(TIMESTAMP_KEY) {
        return parse_activity(obj, timestamp).map(FeedMessage::Activity);
    }

    let category = extract_category(obj, category_key)?;

    if obj.contains_key(CREATED_AT_KEY) || obj.contains_key(CLOSED_AT_KEY) {
        return Ok(FeedMessage::Duration(DurationEvent {
            category,
            created_at: parse_datetime(obj.get(CREATED_AT_KEY), CREATED_AT_KEY)?,
            closed_at: parse_datetime(obj.get(CLOSED_AT_KEY), CLOSED_AT_KEY)?,
        }));
    }

    let count = match COUNT_KEYS.iter().find_map(|key| obj.get(*key)) {
        None | Some(Value::Null) => 1,
        Some(value) => parse_count(value, "count")?,
    };

    Ok(FeedMessage::CategoryCount(CategoryCount { category, count }))
}

fn parse_activity(obj: &Map<String, Value>, timestamp: &Value) -> Result<ActivitySample, FeedError> {
    let timestamp = parse_integer(timestamp)
        .ok_or_else(|| FeedError::parse(format!("invalid timestamp: {}", timestamp)))?;

    let counts = obj
        .iter()
        .filter(|(key, _)| key.as_str() != TIMESTAMP_KEY)
        .map(|(key, value)| -> Result<(EventKind, u64), FeedError> {
            Ok((EventKind::from_name(key), parse_count(value, key)?))
        })
        .collect::<Result<Vec<_>, FeedError>>()?;

    Ok(ActivitySample { timestamp, counts })
}

/// Missing, null, and empty category names all map to [`UNKNOWN_CATEGORY`].
fn extract_category(obj: &Map<String, Value>, category_key: &str) -> Result<String, FeedError> {
    match obj.get(category_key) {
        None | Some(Value::Null) => Ok(UNKNOWN_CATEGORY.to_string()),
        Some(Value::String(s)) if s.is_empty() => Ok(UNKNOWN_CATEGORY.to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(FeedError::parse(format!(
            "{} must be a string, got {}",
            category_key,
            json_type_name(other)
        ))),
    }
}

fn parse_count(value: &Value, field: &str) -> Result<u64, FeedError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| {
        FeedError::parse(format!(
            "{} must be a non-negative integer, got {}",
            field, value
        ))
    })
}

fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

/// Accepts RFC 3339 strings or epoch milliseconds; null means "not set".
fn parse_datetime(value: Option<&Value>, field: &str) -> Result<Option<DateTime<Utc>>, FeedError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| FeedError::parse(format!("invalid {} {:?}: {}", field, s, e))),
        Some(Value::Number(n)) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .map(Some)
            .ok_or_else(|| FeedError::parse(format!("invalid {}: {}", field, n))),
        Some(other) => Err(FeedError::parse(format!(
            "invalid {}: {}",
            field,
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
