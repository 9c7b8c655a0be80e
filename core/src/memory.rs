//! In-process `DocumentStore`.
//!
//! Each collection is a `watch` channel whose value is the document list, so
//! every write notifies open listeners and a listener that falls behind only
//! sees the latest state. Access can be revoked per collection to exercise
//! permission failures.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use uuid::Uuid;

use crate::clock::{resolve_server_timestamps, ServerClock};
use crate::error::StoreError;
use crate::query::Query;
use crate::store::{DocumentStore, Fields, SnapshotStream};
use crate::types::{Document, Snapshot};

#[derive(Debug, Clone, Default)]
struct CollectionState {
    documents: Vec<Document>,
    denied: bool,
}

#[derive(Debug, Default)]
struct Inner {
    collections: HashMap<String, watch::Sender<CollectionState>>,
    clock: ServerClock,
}

impl Inner {
    fn collection(&mut self, name: &str) -> &watch::Sender<CollectionState> {
        self.collections
            .entry(name.to_string())
            .or_insert_with(|| watch::channel(CollectionState::default()).0)
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allow or deny every operation on `collection`. Denying also ends open
    /// listeners with `PermissionDenied`.
    pub fn set_access(&self, collection: &str, allow: bool) {
        self.lock()
            .collection(collection)
            .send_if_modified(|state| {
                let changed = state.denied == allow;
                state.denied = !allow;
                changed
            });
    }

    /// Open listeners on `collection`.
    pub fn listener_count(&self, collection: &str) -> usize {
        self.lock().collection(collection).receiver_count()
    }

    /// Current documents in insertion order, ignoring access rules.
    pub fn documents(&self, collection: &str) -> Vec<Document> {
        let mut inner = self.lock();
        let documents = inner.collection(collection).borrow().documents.clone();
        documents
    }
}

fn check_access(sender: &watch::Sender<CollectionState>, collection: &str) -> Result<(), StoreError> {
    if sender.borrow().denied {
        return Err(denied(collection));
    }
    Ok(())
}

fn denied(collection: &str) -> StoreError {
    StoreError::PermissionDenied(format!("access to {collection} denied"))
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn add(&self, collection: &str, mut fields: Fields) -> Result<Document, StoreError> {
        let mut inner = self.lock();
        let at = inner.clock.now();
        let sender = inner.collection(collection);
        check_access(sender, collection)?;

        resolve_server_timestamps(&mut fields, at);
        let doc = Document {
            id: Uuid::new_v4().to_string(),
            data: fields,
        };
        sender.send_modify(|state| state.documents.push(doc.clone()));
        Ok(doc)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let mut inner = self.lock();
        let sender = inner.collection(collection);
        check_access(sender, collection)?;

        let found = sender.borrow().documents.iter().find(|doc| doc.id == id).cloned();
        found.ok_or(StoreError::NotFound)
    }

    async fn update(&self, collection: &str, id: &str, mut fields: Fields) -> Result<Document, StoreError> {
        let mut inner = self.lock();
        let at = inner.clock.now();
        let sender = inner.collection(collection);
        check_access(sender, collection)?;

        resolve_server_timestamps(&mut fields, at);
        let mut updated = None;
        sender.send_if_modified(|state| match state.documents.iter_mut().find(|doc| doc.id == id) {
            Some(doc) => {
                doc.data.extend(fields);
                updated = Some(doc.clone());
                true
            }
            None => false,
        });
        updated.ok_or(StoreError::NotFound)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let sender = inner.collection(collection);
        check_access(sender, collection)?;

        let mut removed = false;
        sender.send_if_modified(|state| {
            let before = state.documents.len();
            state.documents.retain(|doc| doc.id != id);
            removed = state.documents.len() != before;
            removed
        });
        if removed {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn listen(&self, collection: &str, query: &Query) -> Result<SnapshotStream, StoreError> {
        let receiver = {
            let mut inner = self.lock();
            let sender = inner.collection(collection);
            check_access(sender, collection)?;
            sender.subscribe()
        };
        let query = query.clone();
        let name = collection.to_string();

        let snapshots = stream::unfold(Some((receiver, true)), move |state| {
            let query = query.clone();
            let name = name.clone();
            async move {
                let (mut receiver, first) = state?;
                if !first && receiver.changed().await.is_err() {
                    return Some((Err(StoreError::ChannelClosed), None));
                }
                let current = receiver.borrow_and_update().clone();
                if current.denied {
                    return Some((Err(denied(&name)), None));
                }
                let mut documents = current.documents;
                query.apply(&mut documents);
                Some((Ok(Snapshot { documents }), Some((receiver, false))))
            }
        });
        Ok(snapshots.boxed())
    }
}
