//! In-memory document backend speaking the HTTP protocol `HttpStore` expects.
//!
//! Collections are created on first use. Each one is a `watch` channel over
//! its document list, so writes wake every open listen stream, which then
//! pushes the whole (optionally ordered) document set again.

use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, put},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::{
    net::TcpListener,
    sync::{watch, Mutex, RwLock},
};
use tracing::{debug, info};
use uuid::Uuid;

mod clock;

use clock::{parse_instant, resolve_placeholders, Clock};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    #[serde(default)]
    pub data: Map<String, Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Deserialize)]
pub struct Rules {
    pub allow: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "orderBy")]
    pub order_by: Option<String>,
    #[serde(default)]
    pub direction: Direction,
}

impl ListQuery {
    /// Stable sort on one field. Timestamps compare by instant, and
    /// `createdAt` falls back to the legacy `timestamp` field.
    fn apply(&self, documents: &mut [Document]) {
        let Some(field) = &self.order_by else {
            return;
        };
        documents.sort_by(|a, b| {
            let ord = SortKey::of(a, field)
                .partial_cmp(&SortKey::of(b, field))
                .unwrap_or(Ordering::Equal);
            match self.direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            }
        });
    }
}

/// missing < null < bool < number < timestamp < string < array/object
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

impl<'a> SortKey<'a> {
    fn of(doc: &'a Document, field: &str) -> Self {
        let key = Self::value(doc.data.get(field));
        match key {
            SortKey::Instant(_) => key,
            _ if field == "createdAt" => doc
                .data
                .get("timestamp")
                .and_then(parse_instant)
                .map_or(key, SortKey::Instant),
            _ => key,
        }
    }

    fn value(value: Option<&'a Value>) -> Self {
        let Some(value) = value else {
            return SortKey::Missing;
        };
        if let Some(at) = parse_instant(value) {
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
}

#[derive(Clone, Debug, Default)]
struct Collection {
    documents: Vec<Document>,
    denied: bool,
}

type CollectionHandle = Arc<watch::Sender<Collection>>;

#[derive(Default)]
pub struct Backend {
    collections: RwLock<HashMap<String, CollectionHandle>>,
    clock: Mutex<Clock>,
}

impl Backend {
    async fn collection(&self, name: &str) -> CollectionHandle {
        if let Some(handle) = self.collections.read().await.get(name) {
            return Arc::clone(handle);
        }
        let mut collections = self.collections.write().await;
        let handle = collections
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(watch::channel(Collection::default()).0));
        Arc::clone(handle)
    }

    /// The collection, unless its rules deny access.
    async fn allowed(&self, name: &str) -> Result<CollectionHandle, ApiError> {
        let handle = self.collection(name).await;
        if handle.borrow().denied {
            return Err(ApiError::PermissionDenied(name.to_string()));
        }
        Ok(handle)
    }

    async fn resolve(&self, fields: &mut Map<String, Value>) {
        let at = self.clock.lock().await.now();
        resolve_placeholders(fields, at);
    }
}

pub type Db = Arc<Backend>;

#[derive(Debug)]
pub enum ApiError {
    NotFound,
    PermissionDenied(String),
}

impl ApiError {
    fn body(&self) -> ErrorBody {
        match self {
            ApiError::NotFound => ErrorBody {
                error: "not-found".to_string(),
                message: "document not found".to_string(),
            },
            ApiError::PermissionDenied(collection) => ErrorBody {
                error: "permission-denied".to_string(),
                message: format!("access to {collection} denied"),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::PermissionDenied(_) => StatusCode::FORBIDDEN,
        };
        (status, Json(self.body())).into_response()
    }
}

pub fn app() -> Router {
    router(Db::default())
}

pub fn router(db: Db) -> Router {
    Router::new()
        .route(
            "/v1/collections/{collection}/documents",
            get(list_documents).post(create_document),
        )
        .route(
            "/v1/collections/{collection}/documents/{id}",
            get(get_document).patch(update_document).delete(delete_document),
        )
        .route("/v1/collections/{collection}/listen", get(listen))
        .route("/v1/rules/{collection}", put(set_rules))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn list_documents(
    State(db): State<Db>,
    Path(collection): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<Document>>, ApiError> {
    let handle = db.allowed(&collection).await?;
    let mut documents = handle.borrow().documents.clone();
    query.apply(&mut documents);
    Ok(Json(documents))
}

async fn create_document(
    State(db): State<Db>,
    Path(collection): Path<String>,
    Json(mut fields): Json<Map<String, Value>>,
) -> Result<(StatusCode, Json<Document>), ApiError> {
    let handle = db.allowed(&collection).await?;
    db.resolve(&mut fields).await;
    let doc = Document {
        id: Uuid::new_v4().to_string(),
        data: fields,
    };
    handle.send_modify(|c| c.documents.push(doc.clone()));
    info!(%collection, id = %doc.id, "document created");
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn get_document(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<Json<Document>, ApiError> {
    let handle = db.allowed(&collection).await?;
    let found = handle.borrow().documents.iter().find(|d| d.id == id).cloned();
    found.map(Json).ok_or(ApiError::NotFound)
}

async fn update_document(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
    Json(mut fields): Json<Map<String, Value>>,
) -> Result<Json<Document>, ApiError> {
    let handle = db.allowed(&collection).await?;
    db.resolve(&mut fields).await;
    let mut updated = None;
    handle.send_if_modified(|c| match c.documents.iter_mut().find(|d| d.id == id) {
        Some(doc) => {
            doc.data.extend(fields);
            updated = Some(doc.clone());
            true
        }
        None => false,
    });
    let doc = updated.ok_or(ApiError::NotFound)?;
    info!(%collection, %id, "document updated");
    Ok(Json(doc))
}

async fn delete_document(
    State(db): State<Db>,
    Path((collection, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let handle = db.allowed(&collection).await?;
    let removed = handle.send_if_modified(|c| {
        let before = c.documents.len();
        c.documents.retain(|d| d.id != id);
        c.documents.len() != before
    });
    if !removed {
        return Err(ApiError::NotFound);
    }
    info!(%collection, %id, "document deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn set_rules(
    State(db): State<Db>,
    Path(collection): Path<String>,
    Json(rules): Json<Rules>,
) -> StatusCode {
    let handle = db.collection(&collection).await;
    handle.send_if_modified(|c| {
        let changed = c.denied == rules.allow;
        c.denied = !rules.allow;
        changed
    });
    info!(%collection, allow = rules.allow, "rules updated");
    StatusCode::NO_CONTENT
}

/// One `snapshot` event on open and after every change. Revoking access
/// sends a final `error` event and closes the stream.
async fn listen(
    State(db): State<Db>,
    Path(collection): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    let handle = db.allowed(&collection).await?;
    let receiver = handle.subscribe();
    debug!(%collection, "listener opened");

    let events = stream::unfold(Some((receiver, true)), move |state| {
        let query = query.clone();
        let collection = collection.clone();
        async move {
            let (mut receiver, first) = state?;
            if !first && receiver.changed().await.is_err() {
                return None;
            }
            let current = receiver.borrow_and_update().clone();
            if current.denied {
                let body = ApiError::PermissionDenied(collection).body();
                return Some((Event::default().event("error").json_data(body), None));
            }
            let mut documents = current.documents;
            query.apply(&mut documents);
            let event = Event::default()
                .event("snapshot")
                .json_data(Snapshot { documents });
            Some((event, Some((receiver, false))))
        }
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
