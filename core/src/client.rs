//! Stateless HTTP request builder and response parser for the document
//! backend.
//!
//! # Design
//! `DocumentClient` holds only a `base_url` and carries no mutable state
//! between calls. Each operation is split into a `build_*` method that
//! produces an `HttpRequest` and a `parse_*` method that consumes an
//! `HttpResponse`. `HttpStore` executes the round-trip in between; tests can
//! do the same with any HTTP client.
//!
//! Collection names and document ids are percent-encoded as single path
//! segments.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::http::{HttpMethod, HttpRequest, HttpResponse};
use crate::query::Query;
use crate::store::Fields;
use crate::types::Document;

/// Unreserved characters per RFC 3986 stay as they are.
pub(crate) const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'_').remove(b'.').remove(b'~');

/// Error payload the backend sends with 4xx responses and `error` events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default)]
    pub message: String,
}

impl ErrorBody {
    pub(crate) fn into_store_error(self, status: Option<u16>) -> StoreError {
        match self.error.as_str() {
            "not-found" => StoreError::NotFound,
            "permission-denied" => StoreError::PermissionDenied(self.message),
            _ => StoreError::HttpError {
                status: status.unwrap_or_default(),
                body: format!("{}: {}", self.error, self.message),
            },
        }
    }
}

#[derive(Serialize)]
struct AccessRule {
    allow: bool,
}

/// Synchronous, stateless client for the document backend.
#[derive(Debug, Clone)]
pub struct DocumentClient {
    base_url: String,
}

impl DocumentClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/v1/collections/{}",
            self.base_url,
            utf8_percent_encode(collection, SEGMENT)
        )
    }

    fn document_url(&self, collection: &str, id: &str) -> String {
        format!(
            "{}/documents/{}",
            self.collection_url(collection),
            utf8_percent_encode(id, SEGMENT)
        )
    }

    fn with_query(url: String, query: &Query) -> String {
        let qs = query.to_query_string();
        if qs.is_empty() {
            url
        } else {
            format!("{url}?{qs}")
        }
    }

    pub fn build_list_documents(&self, collection: &str, query: &Query) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: Self::with_query(format!("{}/documents", self.collection_url(collection)), query),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn build_get_document(&self, collection: &str, id: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: self.document_url(collection, id),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn build_create_document(
        &self,
        collection: &str,
        fields: &Fields,
    ) -> Result<HttpRequest, StoreError> {
        Ok(HttpRequest {
            method: HttpMethod::Post,
            path: format!("{}/documents", self.collection_url(collection)),
            headers: json_headers(),
            body: Some(to_body(fields)?),
        })
    }

    pub fn build_update_document(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
    ) -> Result<HttpRequest, StoreError> {
        Ok(HttpRequest {
            method: HttpMethod::Patch,
            path: self.document_url(collection, id),
            headers: json_headers(),
            body: Some(to_body(fields)?),
        })
    }

    pub fn build_delete_document(&self, collection: &str, id: &str) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Delete,
            path: self.document_url(collection, id),
            headers: Vec::new(),
            body: None,
        }
    }

    /// Opens the snapshot stream. The response body is an event stream, so
    /// only its status goes through `check_listen`; frames are decoded by
    /// `EventDecoder`.
    pub fn build_listen(&self, collection: &str, query: &Query) -> HttpRequest {
        HttpRequest {
            method: HttpMethod::Get,
            path: Self::with_query(format!("{}/listen", self.collection_url(collection)), query),
            headers: vec![("accept".to_string(), "text/event-stream".to_string())],
            body: None,
        }
    }

    pub fn build_set_access(&self, collection: &str, allow: bool) -> Result<HttpRequest, StoreError> {
        let body = serde_json::to_string(&AccessRule { allow })
            .map_err(|e| StoreError::SerializationError(e.to_string()))?;
        Ok(HttpRequest {
            method: HttpMethod::Put,
            path: format!(
                "{}/v1/rules/{}",
                self.base_url,
                utf8_percent_encode(collection, SEGMENT)
            ),
            headers: json_headers(),
            body: Some(body),
        })
    }

    pub fn parse_list_documents(&self, response: HttpResponse) -> Result<Vec<Document>, StoreError> {
        check_status(&response, 200)?;
        from_body(&response.body)
    }

    pub fn parse_get_document(&self, response: HttpResponse) -> Result<Document, StoreError> {
        check_status(&response, 200)?;
        from_body(&response.body)
    }

    pub fn parse_create_document(&self, response: HttpResponse) -> Result<Document, StoreError> {
        check_status(&response, 201)?;
        from_body(&response.body)
    }

    pub fn parse_update_document(&self, response: HttpResponse) -> Result<Document, StoreError> {
        check_status(&response, 200)?;
        from_body(&response.body)
    }

    pub fn parse_delete_document(&self, response: HttpResponse) -> Result<(), StoreError> {
        check_status(&response, 204)
    }

    pub fn parse_set_access(&self, response: HttpResponse) -> Result<(), StoreError> {
        check_status(&response, 204)
    }

    pub fn check_listen(&self, response: &HttpResponse) -> Result<(), StoreError> {
        check_status(response, 200)
    }

    /// The error for a listen response that did not open the stream.
    pub fn listen_error(&self, response: HttpResponse) -> StoreError {
        match check_status(&response, 200) {
            Err(err) => err,
            Ok(()) => StoreError::HttpError {
                status: response.status,
                body: "listen stream was not opened".to_string(),
            },
        }
    }
}

fn json_headers() -> Vec<(String, String)> {
    vec![("content-type".to_string(), "application/json".to_string())]
}

fn to_body(fields: &Fields) -> Result<String, StoreError> {
    serde_json::to_string(fields).map_err(|e| StoreError::SerializationError(e.to_string()))
}

fn from_body<T: serde::de::DeserializeOwned>(body: &str) -> Result<T, StoreError> {
    serde_json::from_str(body).map_err(|e| StoreError::DeserializationError(e.to_string()))
}

/// Map non-success status codes to the appropriate `StoreError` variant.
fn check_status(response: &HttpResponse, expected: u16) -> Result<(), StoreError> {
    if response.status == expected {
        return Ok(());
    }
    let body = serde_json::from_str::<ErrorBody>(&response.body).ok();
    match (response.status, body) {
        (404, _) => Err(StoreError::NotFound),
        (403, Some(body)) => Err(StoreError::PermissionDenied(body.message)),
        (403, None) => Err(StoreError::PermissionDenied(response.body.clone())),
        (status, Some(body)) => Err(body.into_store_error(Some(status))),
        (status, None) => Err(StoreError::HttpError {
            status,
            body: response.body.clone(),
        }),
    }
}
