// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared progress state for the single current operation.
//!
//! A [`ProgressTracker`] is a cheap, cloneable handle. The background worker
//! mutates the state through it while HTTP handlers, SSE streams and the CLI
//! read snapshots from it; there is no other channel between them.
//!
//! # State machine
//!
//! ```text
//! start ──> Running ──> Complete
//!                  ├──> Error
//!                  └──> Cancelled
//! ```
//!
//! Terminal states are sinks: `update`, `complete`, `error` and `cancel`
//! only act on a `Running` operation. Only a fresh `start` leaves a terminal
//! state, and it always resets the cancellation flag.
//!
//! Critical sections assign fields and publish a snapshot on a broadcast
//! feed; they never await and never perform I/O.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Default number of transitions buffered for each feed subscriber.
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Kind of long-running operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Model download
    Pull,
    /// Benchmark sweep
    Benchmark,
}

impl OperationKind {
    /// Lowercase name used in messages and on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Pull => "pull",
            OperationKind::Benchmark => "benchmark",
        }
    }

    fn cancelled_message(&self) -> &'static str {
        match self {
            OperationKind::Pull => "Pull cancelled by user",
            OperationKind::Benchmark => "Benchmark cancelled by user",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of the current operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    /// Work in progress
    Running,
    /// Finished successfully
    Complete,
    /// Failed
    Error,
    /// Aborted by the user
    Cancelled,
}

impl Default for OperationStatus {
    fn default() -> Self {
        OperationStatus::Running
    }
}

impl OperationStatus {
    /// Whether no further transition is possible without a new `start`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, OperationStatus::Running)
    }
}

/// Point-in-time state of the current operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationState {
    /// Operation identifier, fresh for every `start`
    pub id: Uuid,
    /// Pull or benchmark
    #[serde(rename = "operation")]
    pub kind: OperationKind,
    /// Current status
    pub status: OperationStatus,
    /// Label of the work in flight
    pub current_item: String,
    /// Human-readable status line
    pub message: String,
    /// Fraction complete in `[0, 1]`
    pub progress: f64,
    /// Units (or bytes) completed
    pub completed: u64,
    /// Units (or bytes) expected
    pub total: u64,
    /// Error text, set only when status is `Error`
    pub error: Option<String>,
    /// Additional context, merged on every update
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// When the operation started
    pub started_at: DateTime<Utc>,
    /// When the operation reached a terminal status
    pub completed_at: Option<DateTime<Utc>>,
}

impl OperationState {
    fn new(kind: OperationKind, current_item: impl Into<String>, total: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            status: OperationStatus::Running,
            current_item: current_item.into(),
            message: format!("Starting {}...", kind),
            progress: 0.0,
            completed: 0,
            total,
            error: None,
            metadata: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Whether the operation is still running.
    pub fn is_running(&self) -> bool {
        self.status == OperationStatus::Running
    }

    /// Whether the operation reached a terminal status.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn finish(&mut self, status: OperationStatus, message: String) {
        self.status = status;
        self.message = message;
        self.completed_at = Some(Utc::now());
    }

    fn apply(&mut self, update: ProgressUpdate) {
        self.message = update.message;
        if let Some(completed) = update.completed {
            self.completed = completed;
        }
        if let Some(total) = update.total {
            self.total = total;
        }
        if let Some(item) = update.current_item {
            self.current_item = item;
        }
        self.metadata.extend(update.metadata);
        if self.total > 0 {
            self.progress = self.completed as f64 / self.total as f64;
        }
    }
}

/// Partial update applied by [`ProgressTracker::update`].
///
/// Only the message is mandatory. Omitted fields keep their current value
/// and metadata entries are merged into the existing map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressUpdate {
    message: String,
    completed: Option<u64>,
    total: Option<u64>,
    current_item: Option<String>,
    metadata: BTreeMap<String, serde_json::Value>,
}

impl ProgressUpdate {
    /// Start an update carrying `message`.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    /// Set the completed count.
    pub fn completed(mut self, completed: u64) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Set the total count.
    pub fn total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    /// Set the current item label.
    pub fn current_item(mut self, item: impl Into<String>) -> Self {
        self.current_item = Some(item.into());
        self
    }

    /// Add one metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug)]
struct Slot {
    state: Option<OperationState>,
    cancel: CancellationToken,
}

#[derive(Debug)]
struct Inner {
    slot: Mutex<Slot>,
    feed: broadcast::Sender<OperationState>,
}

/// Thread-safe holder of the single current [`OperationState`].
///
/// Construct one per application (or per test) and hand clones to every
/// collaborator.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    inner: Arc<Inner>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    /// Create an idle tracker.
    pub fn new() -> Self {
        Self::with_feed_capacity(DEFAULT_FEED_CAPACITY)
    }

    /// Create an idle tracker whose transition feed buffers `capacity`
    /// snapshots per subscriber.
    pub fn with_feed_capacity(capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    state: None,
                    cancel: CancellationToken::new(),
                }),
                feed,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // Every critical section leaves the slot consistent, so a poisoned
        // lock still guards valid data.
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &OperationState) {
        // No subscribers is not an error.
        let _ = self.inner.feed.send(state.clone());
    }

    fn install(&self, slot: &mut Slot, kind: OperationKind, item: String, total: u64) -> Uuid {
        slot.cancel = CancellationToken::new();
        let state = OperationState::new(kind, item, total);
        let id = state.id;
        self.publish(&state);
        slot.state = Some(state);
        id
    }

    /// Replace any previous state with a new running operation.
    ///
    /// Always succeeds, even over a running operation, and resets the
    /// cancellation flag.
    pub fn start(&self, kind: OperationKind, current_item: impl Into<String>, total: u64) -> Uuid {
        let id = {
            let mut slot = self.lock();
            self.install(&mut *slot, kind, current_item.into(), total)
        };
        info!(operation_id = %id, operation = %kind, total, "Operation started");
        id
    }

    /// Atomically claim the operation slot.
    ///
    /// Fails with [`CoreError::OperationInProgress`] while another operation
    /// is running; otherwise behaves like [`ProgressTracker::start`].
    pub fn try_start(
        &self,
        kind: OperationKind,
        current_item: impl Into<String>,
        total: u64,
    ) -> Result<Uuid> {
        let id = {
            let mut slot = self.lock();
            if let Some(running) = slot.state.as_ref().filter(|s| s.is_running()) {
                return Err(CoreError::OperationInProgress(format!(
                    "{} ({})",
                    running.kind, running.current_item
                )));
            }
            self.install(&mut *slot, kind, current_item.into(), total)
        };
        info!(operation_id = %id, operation = %kind, total, "Operation started");
        Ok(id)
    }

    fn with_running<F>(&self, f: F) -> Option<OperationState>
    where
        F: FnOnce(&mut Slot),
    {
        let mut slot = self.lock();
        if !slot.state.as_ref().is_some_and(OperationState::is_running) {
            return None;
        }
        f(&mut *slot);
        let snapshot = slot.state.clone()?;
        self.publish(&snapshot);
        Some(snapshot)
    }

    /// Merge a partial update into the running operation.
    pub fn update(&self, update: ProgressUpdate) {
        self.with_running(|slot| {
            if let Some(state) = slot.state.as_mut() {
                state.apply(update);
            }
        });
    }

    /// Mark the running operation complete.
    pub fn complete(&self, message: impl Into<String>) {
        let message = message.into();
        let done = self.with_running(|slot| {
            if let Some(state) = slot.state.as_mut() {
                state.progress = 1.0;
                state.finish(OperationStatus::Complete, message);
            }
        });
        if let Some(state) = done {
            info!(operation_id = %state.id, message = %state.message, "Operation complete");
        }
    }

    /// Mark the running operation failed.
    pub fn error(&self, error_message: impl Into<String>) {
        let error_message = error_message.into();
        let failed = self.with_running(|slot| {
            if let Some(state) = slot.state.as_mut() {
                let message = format!("Error: {}", error_message);
                state.error = Some(error_message);
                state.finish(OperationStatus::Error, message);
            }
        });
        if let Some(state) = failed {
            info!(operation_id = %state.id, error = ?state.error, "Operation failed");
        }
    }

    /// Cancel the running operation.
    ///
    /// Sets the cancellation flag observed by the worker and moves the state
    /// to `Cancelled`. Returns `false` when nothing was running.
    pub fn cancel(&self) -> bool {
        let cancelled = self.with_running(|slot| {
            slot.cancel.cancel();
            if let Some(state) = slot.state.as_mut() {
                let message = state.kind.cancelled_message().to_string();
                state.finish(OperationStatus::Cancelled, message);
            }
        });
        match cancelled {
            Some(state) => {
                info!(operation_id = %state.id, "Cancellation requested");
                true
            }
            None => {
                debug!("Cancel ignored, no running operation");
                false
            }
        }
    }

    /// Whether the current operation has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.lock().cancel.is_cancelled()
    }

    /// Cancellation token of the current operation.
    ///
    /// The token is replaced on every `start`, so a worker should fetch it
    /// once, right after starting its operation.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.lock().cancel.clone()
    }

    /// Snapshot of the current state, `None` when no operation exists.
    pub fn read(&self) -> Option<OperationState> {
        self.lock().state.clone()
    }

    /// Drop the current state.
    pub fn clear(&self) {
        self.lock().state = None;
    }

    /// Whether an operation exists and is running.
    pub fn is_running(&self) -> bool {
        self.lock()
            .state
            .as_ref()
            .is_some_and(OperationState::is_running)
    }

    /// Subscribe to every transition applied from now on, in order.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationState> {
        self.inner.feed.subscribe()
    }
}
