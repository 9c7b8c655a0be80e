//! Error types for the document stores and the task adapter.
//!
//! # Design
//! `StoreError` is the wire-level taxonomy shared by every `DocumentStore`.
//! `NotFound` and `PermissionDenied` get dedicated variants because callers
//! react to them differently from an unexpected status. `SyncError` is what
//! `TaskSync` hands back to the UI: it says which operation failed and keeps
//! the store error as its source.

use thiserror::Error;

/// Errors returned by `DocumentStore` implementations and `DocumentClient`
/// parse methods.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The addressed document does not exist.
    #[error("document not found")]
    NotFound,

    /// Backend access rules rejected the request.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The backend returned an unexpected non-2xx status.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// A response or pushed event could not be decoded.
    #[error("deserialization failed: {0}")]
    DeserializationError(String),

    /// A request payload could not be encoded as a JSON object.
    #[error("serialization failed: {0}")]
    SerializationError(String),

    /// The request never produced a response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The listen channel ended without being torn down.
    #[error("listen channel closed")]
    ChannelClosed,
}

/// The write a failed mutation was attempting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteAction {
    Add,
    Update,
    Delete,
}

impl WriteAction {
    /// Generic message recorded in the adapter's error state.
    pub fn failure_message(self) -> &'static str {
        match self {
            WriteAction::Add => "failed to add task",
            WriteAction::Update => "failed to update task",
            WriteAction::Delete => "failed to delete task",
        }
    }
}

impl std::fmt::Display for WriteAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WriteAction::Add => "add",
            WriteAction::Update => "update",
            WriteAction::Delete => "delete",
        })
    }
}

/// Errors returned by `TaskSync` operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The title was empty after trimming. Nothing was sent.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// A single create, update, or delete request failed.
    #[error("failed to {action} task")]
    Write {
        action: WriteAction,
        #[source]
        source: StoreError,
    },

    /// The listen channel could not be opened.
    #[error("failed to watch tasks")]
    Subscribe(#[source] StoreError),
}

impl SyncError {
    /// The store error underneath, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            SyncError::EmptyTitle => None,
            SyncError::Write { source, .. } | SyncError::Subscribe(source) => Some(source),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.store_error(), Some(StoreError::NotFound))
    }
}

/// Invalid configuration values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{key} must not be empty")]
    Empty { key: &'static str },

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}
