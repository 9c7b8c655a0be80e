//! Server clock for the in-process store.
//!
//! Readings are truncated to microseconds and strictly increase, so two
//! writes in the same microsecond still get distinct, ordered instants.

use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde_json::{Map, Value};

#[derive(Debug, Default)]
pub struct ServerClock {
    last: Option<DateTime<Utc>>,
}

impl ServerClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&mut self) -> DateTime<Utc> {
        let mut now = Utc::now().trunc_subsecs(6);
        if let Some(last) = self.last {
            if now <= last {
                now = last + Duration::microseconds(1);
            }
        }
        self.last = Some(now);
        now
    }
}

/// RFC 3339, UTC, microsecond precision. Fixed width, so the strings sort
/// chronologically.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// True for the `{".sv": "timestamp"}` placeholder.
pub fn is_server_timestamp(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp")
        }
        _ => false,
    }
}

/// Replace every server-timestamp placeholder, at any depth, with `at`.
pub fn resolve_server_timestamps(fields: &mut Map<String, Value>, at: DateTime<Utc>) {
    let stamp = format_timestamp(at);
    for value in fields.values_mut() {
        resolve_value(value, &stamp);
    }
}

fn resolve_value(value: &mut Value, stamp: &str) {
    if is_server_timestamp(value) {
        *value = Value::String(stamp.to_string());
        return;
    }
    match value {
        Value::Object(map) => map.values_mut().for_each(|v| resolve_value(v, stamp)),
        Value::Array(items) => items.iter_mut().for_each(|v| resolve_value(v, stamp)),
        _ => {}
    }
}
