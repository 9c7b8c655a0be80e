//! Live task mirror with write-through mutations.
//!
//! # Design
//! `TaskSync` is created once per UI session and shared by reference. It
//! owns the listen channel and the local state; the UI reads the state with
//! `state()` or re-renders from `watch()`.
//!
//! - Every pushed snapshot replaces the whole task list. There is no merge.
//! - The listener task is the only writer of `tasks`. Mutations send one
//!   request each and wait for the acknowledgment; the snapshot that follows
//!   is what makes the change visible locally.
//! - Each `subscribe` starts a new epoch. State writes from a listener are
//!   dropped unless its epoch is still current, so nothing from a torn-down
//!   channel can land after `unsubscribe` returns.
//! - Failures are never retried here. A listener failure leaves the adapter
//!   `Errored` until the next `subscribe`; a write failure sets a transient
//!   message and is returned to the caller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::SyncConfig;
use crate::error::{StoreError, SyncError, WriteAction};
use crate::store::{to_fields, DocumentStore, SnapshotStream};
use crate::types::{NewTask, Task, TaskDetails, TaskId, TaskPatch, TaskUpdate};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// Never subscribed.
    #[default]
    Idle,
    /// Listener requested, no snapshot yet.
    Subscribing,
    /// At least one snapshot applied.
    Active,
    /// The listener failed. Stays here until the next `subscribe`.
    Errored,
    /// Torn down.
    Unsubscribed,
}

/// What the UI renders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub phase: SyncPhase,
    /// Tasks of the latest snapshot, in snapshot order.
    pub tasks: Vec<Task>,
    /// Human-readable failure, if any.
    pub error: Option<String>,
    epoch: u64,
}

impl SyncState {
    pub fn is_loading(&self) -> bool {
        self.phase == SyncPhase::Subscribing
    }

    pub fn task(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|task| &task.id == id)
    }
}

pub struct TaskSync<S> {
    store: Arc<S>,
    config: SyncConfig,
    state: Arc<watch::Sender<SyncState>>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<S: DocumentStore> TaskSync<S> {
    pub fn new(store: Arc<S>, config: SyncConfig) -> Self {
        let (state, _) = watch::channel(SyncState::default());
        Self {
            store,
            config,
            state: Arc::new(state),
            listener: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn state(&self) -> SyncState {
        self.state.borrow().clone()
    }

    pub fn tasks(&self) -> Vec<Task> {
        self.state.borrow().tasks.clone()
    }

    pub fn error(&self) -> Option<String> {
        self.state.borrow().error.clone()
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.borrow().phase
    }

    /// Receiver notified on every state change.
    pub fn watch(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    fn listener_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.listener.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the listen channel. Any previous channel is torn down first.
    ///
    /// Returns once the channel is open; snapshots arrive in the background.
    /// If the channel cannot be opened the adapter moves to `Errored` and the
    /// error is also returned.
    pub async fn subscribe(&self) -> Result<(), SyncError> {
        let previous = self.listener_slot().take();
        if let Some(handle) = previous {
            handle.abort();
        }

        let mut epoch = 0;
        self.state.send_modify(|state| {
            state.epoch += 1;
            epoch = state.epoch;
            state.phase = SyncPhase::Subscribing;
            state.error = None;
        });
        info!(collection = %self.config.collection, "subscribing to tasks");

        let snapshots = match self
            .store
            .listen(&self.config.collection, &self.config.query())
            .await
        {
            Ok(snapshots) => snapshots,
            Err(err) => {
                warn!(collection = %self.config.collection, error = %err, "failed to open task listener");
                fail_subscription(&self.state, epoch, &err);
                return Err(SyncError::Subscribe(err));
            }
        };

        let mut slot = self.listener_slot();
        if self.state.borrow().epoch != epoch {
            debug!("subscription superseded before it opened");
            return Ok(());
        }
        let listener = tokio::spawn(pump(snapshots, Arc::clone(&self.state), epoch));
        if let Some(stale) = slot.replace(listener) {
            stale.abort();
        }
        Ok(())
    }

    /// Release the listen channel. No state changes happen afterwards until
    /// the next `subscribe`.
    pub fn unsubscribe(&self) {
        let mut slot = self.listener_slot();
        self.state.send_modify(|state| {
            state.epoch += 1;
            state.phase = SyncPhase::Unsubscribed;
        });
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        info!(collection = %self.config.collection, "unsubscribed from tasks");
    }

    /// Dismiss a transient write error. A listener error stays.
    pub fn clear_error(&self) {
        self.state.send_if_modified(|state| {
            if state.phase == SyncPhase::Errored || state.error.is_none() {
                return false;
            }
            state.error = None;
            true
        });
    }

    /// Create a task and return its backend-assigned id.
    pub async fn add_task(&self, title: &str) -> Result<TaskId, SyncError> {
        self.add_task_with(title, TaskDetails::default()).await
    }

    /// Create a task carrying optional details. A blank description is not
    /// written.
    pub async fn add_task_with(&self, title: &str, details: TaskDetails) -> Result<TaskId, SyncError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SyncError::EmptyTitle);
        }

        let task = NewTask::new(title, self.config.user_id.as_str()).with_details(details.normalized());
        let fields = to_fields(&task).map_err(|err| self.write_failed(WriteAction::Add, err))?;
        let doc = self
            .store
            .add(&self.config.collection, fields)
            .await
            .map_err(|err| self.write_failed(WriteAction::Add, err))?;

        info!(id = %doc.id, "task added");
        Ok(TaskId::from(doc.id))
    }

    pub async fn toggle_task(&self, id: &TaskId, completed: bool) -> Result<(), SyncError> {
        self.update_task(id, TaskPatch::completed(completed)).await
    }

    /// Change the given fields of a task. A new title is trimmed and must not
    /// be empty; a blank description is left out.
    pub async fn update_task(&self, id: &TaskId, mut patch: TaskPatch) -> Result<(), SyncError> {
        if let Some(title) = patch.title.as_mut() {
            let trimmed = title.trim();
            if trimmed.is_empty() {
                return Err(SyncError::EmptyTitle);
            }
            *title = trimmed.to_string();
        }
        patch.details = patch.details.normalized();

        let fields = to_fields(&TaskUpdate::new(&patch))
            .map_err(|err| self.write_failed(WriteAction::Update, err))?;
        self.store
            .update(&self.config.collection, id.as_str(), fields)
            .await
            .map_err(|err| self.write_failed(WriteAction::Update, err))?;

        info!(%id, "task updated");
        Ok(())
    }

    pub async fn delete_task(&self, id: &TaskId) -> Result<(), SyncError> {
        self.store
            .delete(&self.config.collection, id.as_str())
            .await
            .map_err(|err| self.write_failed(WriteAction::Delete, err))?;

        info!(%id, "task deleted");
        Ok(())
    }

    fn write_failed(&self, action: WriteAction, source: StoreError) -> SyncError {
        warn!(%action, error = %source, "task write failed");
        self.state.send_if_modified(|state| {
            if matches!(state.phase, SyncPhase::Errored | SyncPhase::Unsubscribed) {
                return false;
            }
            state.error = Some(action.failure_message().to_string());
            true
        });
        SyncError::Write { action, source }
    }
}

impl<S> Drop for TaskSync<S> {
    fn drop(&mut self) {
        let slot = self.listener.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = slot.take() {
            handle.abort();
        }
    }
}

/// Forward snapshots into the state until the channel fails or the epoch
/// moves on.
async fn pump(mut snapshots: SnapshotStream, state: Arc<watch::Sender<SyncState>>, epoch: u64) {
    while let Some(item) = snapshots.next().await {
        match item {
            Ok(snapshot) => {
                let now = Utc::now();
                let tasks: Vec<Task> = snapshot
                    .documents
                    .iter()
                    .map(|doc| Task::from_document(doc, now))
                    .collect();
                let count = tasks.len();
                let applied = apply(&state, epoch, move |current| {
                    current.phase = SyncPhase::Active;
                    current.tasks = tasks;
                    current.error = None;
                });
                if !applied {
                    return;
                }
                debug!(count, "applied task snapshot");
            }
            Err(err) => {
                warn!(error = %err, "task listener failed");
                fail_subscription(&state, epoch, &err);
                return;
            }
        }
    }
    warn!("task listener ended");
    fail_subscription(&state, epoch, &StoreError::ChannelClosed);
}

/// Run `modify` only if `epoch` is still the live subscription.
fn apply(
    state: &watch::Sender<SyncState>,
    epoch: u64,
    modify: impl FnOnce(&mut SyncState),
) -> bool {
    state.send_if_modified(|current| {
        if current.epoch != epoch || current.phase == SyncPhase::Unsubscribed {
            return false;
        }
        modify(current);
        true
    })
}

fn fail_subscription(state: &watch::Sender<SyncState>, epoch: u64, err: &StoreError) {
    apply(state, epoch, |current| {
        current.phase = SyncPhase::Errored;
        current.error = Some(format!("failed to watch tasks: {err}"));
    });
}
