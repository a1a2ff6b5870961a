// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Model download as a tracked operation.

use std::sync::Arc;

use ollamometer_core::backend::{InferenceBackend, PullProgress};
use ollamometer_core::metrics::bytes_to_mb;
use ollamometer_core::{OperationKind, ProgressTracker, ProgressUpdate};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::runner::{Result, RunnerError};

/// Status line shown for one pull notification.
pub fn pull_message(progress: &PullProgress) -> String {
    if progress.total > 0 {
        format!(
            "{}: {:.1} MB / {:.1} MB",
            progress.status,
            bytes_to_mb(progress.completed),
            bytes_to_mb(progress.total)
        )
    } else {
        progress.status.clone()
    }
}

/// Downloads models through an [`InferenceBackend`], reporting on the
/// shared tracker.
#[derive(Clone)]
pub struct PullTask {
    backend: Arc<dyn InferenceBackend>,
    tracker: ProgressTracker,
}

impl std::fmt::Debug for PullTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PullTask").finish_non_exhaustive()
    }
}

impl PullTask {
    /// Create a pull task reporting through `tracker`.
    pub fn new(backend: Arc<dyn InferenceBackend>, tracker: ProgressTracker) -> Self {
        Self { backend, tracker }
    }

    /// Start a pull and wait for it.
    ///
    /// Returns `Ok(false)` when the download failed or was cancelled; the
    /// tracker carries the details.
    pub async fn run(&self, model: &str) -> bool {
        self.tracker.start(OperationKind::Pull, model, 0);
        self.execute(model).await
    }

    /// Claim the tracker and pull on a background task.
    pub fn spawn(&self, model: impl Into<String>) -> Result<JoinHandle<bool>> {
        let model = model.into();
        if model.trim().is_empty() {
            return Err(RunnerError::InvalidPlan("no model given".to_string()));
        }
        self.tracker.try_start(OperationKind::Pull, model.as_str(), 0)?;
        let task = self.clone();
        Ok(tokio::spawn(async move { task.execute(&model).await }))
    }

    async fn execute(&self, model: &str) -> bool {
        let token = self.tracker.cancellation_token();
        let (tx, mut rx) = mpsc::unbounded_channel::<PullProgress>();

        let tracker = self.tracker.clone();
        let forward = async move {
            while let Some(progress) = rx.recv().await {
                tracker.update(
                    ProgressUpdate::new(pull_message(&progress))
                        .completed(progress.completed)
                        .total(progress.total),
                );
            }
        };

        let download = async {
            tokio::select! {
                result = self.backend.pull(model, tx) => Some(result),
                _ = token.cancelled() => None,
            }
        };

        let (outcome, ()) = tokio::join!(download, forward);
        match outcome {
            Some(Ok(())) => {
                self.tracker.complete(format!("Successfully pulled {}", model));
                metrics::counter!("ollamometer_pulls_total", "outcome" => "success").increment(1);
                true
            }
            Some(Err(e)) => {
                warn!(model = %model, error = %e, "Pull failed");
                self.tracker.error(format!("Failed to pull {}: {}", model, e));
                metrics::counter!("ollamometer_pulls_total", "outcome" => "error").increment(1);
                false
            }
            None => {
                info!(model = %model, "Pull cancelled");
                false
            }
        }
    }
}
