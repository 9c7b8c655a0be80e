//! Listen/list queries and document ordering.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use percent_encoding::utf8_percent_encode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::client::SEGMENT;
use crate::types::{fields, parse_timestamp, Document};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Asc => "asc",
            Direction::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Which documents a listener receives and in what order. An empty query
/// means the whole collection in backend order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn order_by(field: impl Into<String>, direction: Direction) -> Self {
        Self {
            order_by: Some(OrderBy {
                field: field.into(),
                direction,
            }),
        }
    }

    /// Descending by creation time.
    pub fn newest_first() -> Self {
        Self::order_by(fields::CREATED_AT, Direction::Desc)
    }

    /// URL query string, without the leading `?`. Empty when unordered.
    pub fn to_query_string(&self) -> String {
        match &self.order_by {
            Some(order) => format!(
                "orderBy={}&direction={}",
                utf8_percent_encode(&order.field, SEGMENT),
                order.direction.as_str()
            ),
            None => String::new(),
        }
    }

    /// Sort in place. Stable, so equal keys keep backend order.
    pub fn apply(&self, documents: &mut [Document]) {
        if let Some(order) = &self.order_by {
            documents.sort_by(|a, b| {
                let ord = sort_key(a, &order.field)
                    .partial_cmp(&sort_key(b, &order.field))
                    .unwrap_or(Ordering::Equal);
                match order.direction {
                    Direction::Asc => ord,
                    Direction::Desc => ord.reverse(),
                }
            });
        }
    }
}

/// Position of a field value in an ordered result. Variants sort in
/// declaration order; timestamps in any accepted encoding compare by instant.
#[derive(Debug, PartialEq, PartialOrd)]
enum SortKey<'a> {
    Missing,
    Null,
    Bool(bool),
    Number(f64),
    Instant(DateTime<Utc>),
    Text(&'a str),
    Other,
}

/// Ordering on `createdAt` reads the `timestamp` alias when `createdAt` is
/// unusable, the same way `Task::from_document` does.
fn sort_key<'a>(doc: &'a Document, field: &str) -> SortKey<'a> {
    let key = value_key(doc.data.get(field));
    if field == fields::CREATED_AT && !matches!(key, SortKey::Instant(_)) {
        if let Some(at) = doc.data.get(fields::TIMESTAMP).and_then(parse_timestamp) {
            return SortKey::Instant(at);
        }
    }
    key
}

fn value_key(value: Option<&Value>) -> SortKey<'_> {
    let Some(value) = value else {
        return SortKey::Missing;
    };
    if let Some(at) = parse_timestamp(value) {
        return SortKey::Instant(at);
    }
    match value {
        Value::Null => SortKey::Null,
        Value::Bool(b) => SortKey::Bool(*b),
        Value::Number(n) => SortKey::Number(n.as_f64().unwrap_or_default()),
        Value::String(s) => SortKey::Text(s),
        Value::Array(_) | Value::Object(_) => SortKey::Other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, created: Value) -> Document {
        let mut data = serde_json::Map::new();
        if !created.is_null() {
            data.insert("createdAt".to_string(), created);
        }
        Document {
            id: id.to_string(),
            data,
        }
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn unordered_query_keeps_backend_order() {
        let mut docs = vec![doc("b", json!("2")), doc("a", json!("1"))];
        Query::default().apply(&mut docs);
        assert_eq!(ids(&docs), ["b", "a"]);
        assert_eq!(Query::default().to_query_string(), "");
    }

    #[test]
    fn newest_first_sorts_descending() {
        let mut docs = vec![
            doc("old", json!("2025-01-01T00:00:00.000000Z")),
            doc("new", json!("2025-03-01T00:00:00.000000Z")),
            doc("mid", json!("2025-02-01T00:00:00.000000Z")),
            doc("none", Value::Null),
        ];
        Query::newest_first().apply(&mut docs);
        assert_eq!(ids(&docs), ["new", "mid", "old", "none"]);
    }

    #[test]
    fn ties_keep_insertion_order() {
        let mut docs = vec![doc("x", json!(1)), doc("y", json!(1)), doc("z", json!(0))];
        Query::order_by("createdAt", Direction::Asc).apply(&mut docs);
        assert_eq!(ids(&docs), ["z", "x", "y"]);
    }

    #[test]
    fn mixed_timestamp_encodings_sort_by_instant() {
        let legacy = Document {
            id: "legacy".to_string(),
            data: json!({ "timestamp": "2026-06-01T00:00:00Z" })
                .as_object()
                .cloned()
                .unwrap(),
        };
        let mut docs = vec![
            doc("whole", json!("2026-01-01T00:00:00Z")),
            doc("fraction", json!("2026-01-01T00:00:00.500000Z")),
            legacy,
            doc("seconds", json!({ "seconds": 1_767_225_601, "nanoseconds": 0 })),
            doc("seconds-early", json!({ "seconds": 1_767_225_599 })),
            doc("none", Value::Null),
        ];
        Query::newest_first().apply(&mut docs);
        assert_eq!(
            ids(&docs),
            ["legacy", "seconds", "fraction", "whole", "seconds-early", "none"]
        );
    }

    #[test]
    fn unparseable_created_at_falls_back_to_timestamp() {
        let mut docs = vec![
            doc("plain", json!("2026-01-02T00:00:00Z")),
            Document {
                id: "alias".to_string(),
                data: json!({ "createdAt": "soon", "timestamp": "2026-01-03T00:00:00Z" })
                    .as_object()
                    .cloned()
                    .unwrap(),
            },
        ];
        Query::newest_first().apply(&mut docs);
        assert_eq!(ids(&docs), ["alias", "plain"]);
    }

    #[test]
    fn query_string_escapes_field_names() {
        let query = Query::order_by("due date&x", Direction::Asc);
        assert_eq!(query.to_query_string(), "orderBy=due%20date%26x&direction=asc");
    }

    #[test]
    fn query_string_encodes_order() {
        assert_eq!(
            Query::newest_first().to_query_string(),
            "orderBy=createdAt&direction=desc"
        );
    }
}
