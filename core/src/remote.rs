//! `DocumentStore` over HTTP.
//!
//! Executes `DocumentClient` requests with `reqwest`. The listen channel is a
//! long-lived GET whose body is decoded frame by frame as chunks arrive.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tracing::debug;

use crate::client::DocumentClient;
use crate::config::RemoteConfig;
use crate::error::StoreError;
use crate::events::{decode_listen_event, EventDecoder};
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::Query;
use crate::store::{DocumentStore, Fields, SnapshotStream};
use crate::types::{Document, Snapshot};

#[derive(Debug, Clone)]
pub struct HttpStore {
    client: DocumentClient,
    http: reqwest::Client,
}

impl HttpStore {
    pub fn new(config: &RemoteConfig) -> Self {
        Self {
            client: DocumentClient::new(&config.base_url),
            http: reqwest::Client::new(),
        }
    }

    pub fn client(&self) -> &DocumentClient {
        &self.client
    }

    /// Allow or deny access to a collection on the backend.
    pub async fn set_access(&self, collection: &str, allow: bool) -> Result<(), StoreError> {
        let req = self.client.build_set_access(collection, allow)?;
        let response = self.execute(req).await?;
        self.client.parse_set_access(response)
    }

    async fn send(&self, req: HttpRequest) -> Result<reqwest::Response, StoreError> {
        let method = match req.method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        debug!(method = req.method.as_str(), path = %req.path, "sending request");

        let mut builder = self.http.request(method, &req.path);
        for (key, value) in &req.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }
        if let Some(body) = req.body {
            builder = builder.body(body);
        }
        builder
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))
    }

    async fn execute(&self, req: HttpRequest) -> Result<HttpResponse, StoreError> {
        let response = self.send(req).await?;
        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.to_string(), v.to_str().ok()?.to_string())))
            .collect();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[async_trait]
impl DocumentStore for HttpStore {
    async fn add(&self, collection: &str, fields: Fields) -> Result<Document, StoreError> {
        let req = self.client.build_create_document(collection, &fields)?;
        let response = self.execute(req).await?;
        self.client.parse_create_document(response)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        let response = self.execute(self.client.build_get_document(collection, id)).await?;
        self.client.parse_get_document(response)
    }

    async fn update(&self, collection: &str, id: &str, fields: Fields) -> Result<Document, StoreError> {
        let req = self.client.build_update_document(collection, id, &fields)?;
        let response = self.execute(req).await?;
        self.client.parse_update_document(response)
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let response = self.execute(self.client.build_delete_document(collection, id)).await?;
        self.client.parse_delete_document(response)
    }

    async fn listen(&self, collection: &str, query: &Query) -> Result<SnapshotStream, StoreError> {
        let response = self.send(self.client.build_listen(collection, query)).await?;
        let status = response.status().as_u16();
        if status != 200 {
            let body = response
                .text()
                .await
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            return Err(self.client.listen_error(HttpResponse {
                status,
                headers: Vec::new(),
                body,
            }));
        }

        let chunks = Box::pin(response.bytes_stream());
        let state = ListenState {
            chunks,
            decoder: EventDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        };
        let snapshots = stream::unfold(state, |mut state| async move {
            loop {
                if state.done {
                    return None;
                }
                if let Some(item) = state.pending.pop_front() {
                    state.done = item.is_err();
                    return Some((item, state));
                }
                match state.chunks.next().await {
                    Some(Ok(chunk)) => {
                        let items = state.decoder.push(&chunk);
                        state.pending.extend(items.iter().filter_map(decode_listen_event));
                    }
                    Some(Err(e)) => state.pending.push_back(Err(StoreError::Transport(e.to_string()))),
                    None => state.pending.push_back(Err(StoreError::ChannelClosed)),
                }
            }
        });
        Ok(snapshots.boxed())
    }
}

/// An `Err` item is the last one the listener yields.
struct ListenState<S> {
    chunks: S,
    decoder: EventDecoder,
    pending: VecDeque<Result<Snapshot, StoreError>>,
    done: bool,
}
