//! Task and document types.
//!
//! # Design
//! The backend stores schemaless documents (`Document`: an id plus a JSON
//! object). `Task` is the typed view the adapter exposes; `Task::from_document`
//! is the only place that knows how task fields are laid out in a document,
//! and it never fails: missing or mistyped fields fall back to defaults so a
//! single malformed document cannot break a whole snapshot.
//!
//! `createdAt` is the canonical creation field. `timestamp` carries the same
//! instant on every write and is only read when `createdAt` is unusable.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Field names of a task document.
pub mod fields {
    pub const TITLE: &str = "title";
    pub const COMPLETED: &str = "completed";
    pub const CREATED_AT: &str = "createdAt";
    /// Deprecated alias of `CREATED_AT`, written for older readers.
    pub const TIMESTAMP: &str = "timestamp";
    pub const UPDATED_AT: &str = "updatedAt";
    pub const USER_ID: &str = "userId";
    pub const DESCRIPTION: &str = "description";
    pub const DUE_DATE: &str = "dueDate";
    pub const PRIORITY: &str = "priority";
}

/// Owner recorded for documents that carry no `userId`.
pub const UNKNOWN_USER_ID: &str = "unknown";

/// Backend-assigned task identifier. Opaque to the client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A stored document: backend id plus its field map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

/// The full document set of a collection at one point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    fn from_value(value: &Value) -> Option<Self> {
        match value.as_str()? {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }
}

/// Optional task attributes. Absent ones are not written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

impl TaskDetails {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn due_date(mut self, due_date: DateTime<Utc>) -> Self {
        self.due_date = Some(due_date);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Trimmed description, dropped when blank.
    pub(crate) fn normalized(mut self) -> Self {
        self.description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        self
    }

    fn from_data(data: &Map<String, Value>) -> Self {
        Self {
            description: data
                .get(fields::DESCRIPTION)
                .and_then(Value::as_str)
                .map(str::to_string),
            due_date: data.get(fields::DUE_DATE).and_then(parse_timestamp),
            priority: data.get(fields::PRIORITY).and_then(Priority::from_value),
        }
    }
}

/// A task as mirrored from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
    #[serde(flatten)]
    pub details: TaskDetails,
}

impl Task {
    /// Map a document to a task, filling defaults for anything missing.
    ///
    /// `now` stands in for a creation time the document does not carry.
    pub fn from_document(doc: &Document, now: DateTime<Utc>) -> Self {
        let data = &doc.data;
        let title = data
            .get(fields::TITLE)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let completed = data.get(fields::COMPLETED).is_some_and(truthy);
        let created_at = data
            .get(fields::CREATED_AT)
            .and_then(parse_timestamp)
            .or_else(|| data.get(fields::TIMESTAMP).and_then(parse_timestamp))
            .unwrap_or(now);
        let updated_at = data
            .get(fields::UPDATED_AT)
            .and_then(parse_timestamp)
            .unwrap_or(created_at);
        let user_id = data
            .get(fields::USER_ID)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_USER_ID)
            .to_string();

        Self {
            id: TaskId::new(doc.id.clone()),
            title,
            completed,
            created_at,
            updated_at,
            user_id,
            details: TaskDetails::from_data(data),
        }
    }
}

/// JSON truthiness: `null`, `false`, `0`, and `""` are falsy.
fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Parse a stored timestamp: an RFC 3339 string or a
/// `{"seconds": .., "nanoseconds": ..}` object.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
        Value::Object(map) => {
            let seconds = map.get("seconds")?.as_i64()?;
            let nanos = map.get("nanoseconds").and_then(Value::as_u64).unwrap_or(0);
            DateTime::from_timestamp(seconds, u32::try_from(nanos).ok()?)
        }
        _ => None,
    }
}

/// Placeholder the backend replaces with its own clock reading.
///
/// Serializes as `{".sv": "timestamp"}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerTimestamp;

impl Serialize for ServerTimestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(".sv", "timestamp")?;
        map.end()
    }
}

/// Create payload for a task.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub title: String,
    pub completed: bool,
    pub created_at: ServerTimestamp,
    pub timestamp: ServerTimestamp,
    pub updated_at: ServerTimestamp,
    pub user_id: String,
    #[serde(flatten)]
    pub details: TaskDetails,
}

impl NewTask {
    pub fn new(title: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            completed: false,
            created_at: ServerTimestamp,
            timestamp: ServerTimestamp,
            updated_at: ServerTimestamp,
            user_id: user_id.into(),
            details: TaskDetails::default(),
        }
    }

    pub fn with_details(mut self, details: TaskDetails) -> Self {
        self.details = details;
        self
    }
}

/// Fields to change on an existing task. Omitted fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(flatten)]
    pub details: TaskDetails,
}

impl TaskPatch {
    pub fn completed(completed: bool) -> Self {
        Self {
            completed: Some(completed),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn details(details: TaskDetails) -> Self {
        Self {
            details,
            ..Self::default()
        }
    }
}

/// Update payload: the patch plus a refreshed `updatedAt`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskUpdate<'a> {
    #[serde(flatten)]
    pub patch: &'a TaskPatch,
    pub updated_at: ServerTimestamp,
}

impl<'a> TaskUpdate<'a> {
    pub fn new(patch: &'a TaskPatch) -> Self {
        Self {
            patch,
            updated_at: ServerTimestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(data: Value) -> Document {
        Document {
            id: "t1".to_string(),
            data: data.as_object().cloned().unwrap(),
        }
    }

    fn now() -> DateTime<Utc> {
        "2026-01-01T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn maps_complete_document() {
        let task = Task::from_document(
            &doc(json!({
                "title": "Buy milk",
                "completed": true,
                "createdAt": "2025-05-01T08:00:00.000001Z",
                "timestamp": "2025-05-01T08:00:00.000001Z",
                "updatedAt": "2025-05-02T08:00:00Z",
                "userId": "test-user"
            })),
            now(),
        );
        assert_eq!(task.id.as_str(), "t1");
        assert_eq!(task.title, "Buy milk");
        assert!(task.completed);
        assert_eq!(task.created_at.to_rfc3339(), "2025-05-01T08:00:00.000001+00:00");
        assert_eq!(task.updated_at.to_rfc3339(), "2025-05-02T08:00:00+00:00");
        assert_eq!(task.user_id, "test-user");
    }

    #[test]
    fn empty_document_gets_defaults() {
        let task = Task::from_document(&doc(json!({})), now());
        assert_eq!(task.title, "");
        assert!(!task.completed);
        assert_eq!(task.created_at, now());
        assert_eq!(task.updated_at, now());
        assert_eq!(task.user_id, UNKNOWN_USER_ID);
    }

    #[test]
    fn timestamp_alias_is_used_when_created_at_missing() {
        let task = Task::from_document(
            &doc(json!({ "title": "old", "timestamp": "2024-12-31T23:59:59Z" })),
            now(),
        );
        assert_eq!(task.created_at.to_rfc3339(), "2024-12-31T23:59:59+00:00");
    }

    #[test]
    fn created_at_wins_over_timestamp() {
        let task = Task::from_document(
            &doc(json!({
                "createdAt": "2025-01-01T00:00:00Z",
                "timestamp": "2020-01-01T00:00:00Z"
            })),
            now(),
        );
        assert_eq!(task.created_at.to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn seconds_object_timestamp_is_accepted() {
        let ts = parse_timestamp(&json!({ "seconds": 1_700_000_000, "nanoseconds": 5000 })).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_nanos(), 5000);
    }

    #[test]
    fn falsy_completed_values() {
        for value in [json!(null), json!(false), json!(0), json!("")] {
            let task = Task::from_document(&doc(json!({ "completed": value })), now());
            assert!(!task.completed, "{value} should be falsy");
        }
        for value in [json!(true), json!(1), json!("yes")] {
            let task = Task::from_document(&doc(json!({ "completed": value })), now());
            assert!(task.completed, "{value} should be truthy");
        }
    }

    #[test]
    fn new_task_serializes_server_timestamps() {
        let body = serde_json::to_value(NewTask::new("Buy milk", "test-user")).unwrap();
        assert_eq!(
            body,
            json!({
                "title": "Buy milk",
                "completed": false,
                "createdAt": { ".sv": "timestamp" },
                "timestamp": { ".sv": "timestamp" },
                "updatedAt": { ".sv": "timestamp" },
                "userId": "test-user"
            })
        );
    }

    #[test]
    fn maps_optional_details() {
        let task = Task::from_document(
            &doc(json!({
                "description": "2 litres",
                "dueDate": "2026-02-01T09:00:00Z",
                "priority": "high"
            })),
            now(),
        );
        assert_eq!(task.details.description.as_deref(), Some("2 litres"));
        assert_eq!(task.details.due_date.unwrap().to_rfc3339(), "2026-02-01T09:00:00+00:00");
        assert_eq!(task.details.priority, Some(Priority::High));

        let task = Task::from_document(
            &doc(json!({ "description": 3, "dueDate": "later", "priority": "urgent" })),
            now(),
        );
        assert_eq!(task.details, TaskDetails::default());
    }

    #[test]
    fn new_task_writes_present_details_only() {
        let details = TaskDetails::default()
            .description("  semi-skimmed  ")
            .priority(Priority::Low)
            .normalized();
        let body = serde_json::to_value(NewTask::new("Buy milk", "test-user").with_details(details)).unwrap();
        assert_eq!(body["description"], "semi-skimmed");
        assert_eq!(body["priority"], "low");
        assert!(body.get("dueDate").is_none());
    }

    #[test]
    fn task_update_carries_only_present_fields() {
        let patch = TaskPatch::completed(true);
        let body = serde_json::to_value(TaskUpdate::new(&patch)).unwrap();
        assert_eq!(
            body,
            json!({ "completed": true, "updatedAt": { ".sv": "timestamp" } })
        );
    }
}
