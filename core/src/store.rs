//! The document backend as seen by the adapter.
//!
//! # Design
//! `DocumentStore` is the seam between `TaskSync` and whatever hosts the
//! data. It offers the primitives a managed document database offers:
//! create with a server-assigned id, update and delete by id, and a live
//! listener that pushes the full matching document set on open and after
//! every change. Server-time fields are requested with `ServerTimestamp`
//! placeholders inside the written fields.

use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::query::Query;
use crate::types::{Document, Snapshot};

/// Field map of a document write.
pub type Fields = Map<String, Value>;

/// Pushed snapshots. An `Err` item ends the listener: no further items
/// follow it.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot, StoreError>>;

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create a document; the store assigns its id.
    async fn add(&self, collection: &str, fields: Fields) -> Result<Document, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError>;

    /// Merge `fields` into an existing document. `NotFound` if it is gone.
    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, StoreError>;

    /// Hard delete. `NotFound` if it is gone.
    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Open a live listener. Dropping the stream releases it.
    async fn listen(&self, collection: &str, query: &Query) -> Result<SnapshotStream, StoreError>;
}

/// Encode a payload as a write's field map. Anything that is not a JSON
/// object is rejected.
pub fn to_fields<T: Serialize>(value: &T) -> Result<Fields, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(other) => Err(StoreError::SerializationError(format!(
            "expected a JSON object, got {other}"
        ))),
        Err(e) => Err(StoreError::SerializationError(e.to_string())),
    }
}
