use chrono::{DateTime, Duration, SecondsFormat, SubsecRound, Utc};
use serde_json::{Map, Value};

/// Monotonic server clock with microsecond resolution.
#[derive(Debug, Default)]
pub struct Clock {
    last: Option<DateTime<Utc>>,
}

impl Clock {
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

/// Replace `{".sv": "timestamp"}` placeholders, at any depth, with `at`.
pub fn resolve_placeholders(fields: &mut Map<String, Value>, at: DateTime<Utc>) {
    let stamp = Value::String(at.to_rfc3339_opts(SecondsFormat::Micros, true));
    for value in fields.values_mut() {
        resolve(value, &stamp);
    }
}

/// An RFC 3339 string or a `{"seconds", "nanoseconds"}` object.
pub fn parse_instant(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s).ok().map(|t| t.with_timezone(&Utc)),
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = map.get("nanoseconds").and_then(Value::as_u64).unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

fn is_placeholder(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|map| map.len() == 1 && map.get(".sv").and_then(Value::as_str) == Some("timestamp"))
}

fn resolve(value: &mut Value, stamp: &Value) {
    if is_placeholder(value) {
        *value = stamp.clone();
        return;
    }
    match value {
        Value::Object(map) => map.values_mut().for_each(|v| resolve(v, stamp)),
        Value::Array(items) => items.iter_mut().for_each(|v| resolve(v, stamp)),
        _ => {}
    }
}
