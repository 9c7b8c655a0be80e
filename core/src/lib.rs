//! Real-time task synchronization over a document backend.
//!
//! # Overview
//! `TaskSync` keeps a local mirror of a remote `tasks` collection: it opens a
//! live listener, replaces its task list with every snapshot the backend
//! pushes, and offers add/toggle/update/delete operations that write straight
//! through to the backend. The UI observes the mirror through a `watch`
//! channel.
//!
//! # Design
//! - `DocumentStore` is the backend seam. `HttpStore` talks to the HTTP
//!   backend; `MemoryStore` runs in-process.
//! - `DocumentClient` is stateless and sans-IO: each backend operation is a
//!   `build_*` (produces an `HttpRequest`) and a `parse_*` (consumes an
//!   `HttpResponse`), so the wire format is testable without a server.
//! - Document DTOs are defined independently from the mock-backend crate;
//!   integration tests catch schema drift.

pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod http;
pub mod memory;
pub mod query;
pub mod remote;
pub mod store;
pub mod sync;
pub mod types;

pub use client::DocumentClient;
pub use config::{RemoteConfig, SyncConfig, TaskOrder};
pub use error::{ConfigError, StoreError, SyncError, WriteAction};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use memory::MemoryStore;
pub use query::{Direction, OrderBy, Query};
pub use remote::HttpStore;
pub use store::{DocumentStore, Fields, SnapshotStream};
pub use sync::{SyncPhase, SyncState, TaskSync};
pub use types::{Document, NewTask, Priority, Snapshot, Task, TaskDetails, TaskId, TaskPatch};
