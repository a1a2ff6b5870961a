// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmark sweep orchestration.
//!
//! A sweep runs every `(model, prompt, run)` unit of a [`SweepPlan`] in
//! order, one at a time, reporting through the shared [`ProgressTracker`]:
//!
//! - models are unloaded before and after their units so each model starts
//!   cold and its first unit includes the load time;
//! - a failed unit is logged and skipped, the sweep continues;
//! - cancellation is checked before every unit and discards the whole
//!   sweep's results;
//! - a panic inside the sweep is reported as `Benchmark failed: ...`.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use ollamometer_benchmarks::{BenchmarkRunner, RunnerSettings, SweepPlan};
//!
//! let runner = Arc::new(BenchmarkRunner::new(backend, tracker.clone(), RunnerSettings::default()));
//! let plan = SweepPlan::new(vec!["llama3.2:1b".into()], prompts, 3)?;
//! let handle = runner.clone().spawn(plan)?;
//! let results = handle.await??;
//! ```

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use ollamometer_core::backend::InferenceBackend;
use ollamometer_core::config::{BenchmarkConfig, PromptSpec};
use ollamometer_core::{
    BenchmarkUnit, CoreError, MeasurementRecord, OperationKind, ProgressTracker, ProgressUpdate,
    ResultSet,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Longest prompt excerpt carried in progress metadata.
const PROMPT_PREVIEW_CHARS: usize = 200;

/// Errors returned by the benchmark runner.
#[derive(Debug, Error)]
pub enum RunnerError {
    /// The plan cannot be executed
    #[error("Invalid benchmark plan: {0}")]
    InvalidPlan(String),

    /// Another operation holds the tracker
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The sweep itself failed
    #[error("Benchmark failed: {0}")]
    Failed(String),
}

/// Result type for runner operations.
pub type Result<T> = std::result::Result<T, RunnerError>;

/// Validated input of one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepPlan {
    models: Vec<String>,
    prompts: Vec<PromptSpec>,
    runs_per_test: u32,
    total_units: u64,
}

impl SweepPlan {
    /// Validate a plan.
    ///
    /// Models and prompts must be non-empty, `runs_per_test` at least 1 and
    /// the unit count must fit in a `u64`.
    pub fn new(models: Vec<String>, prompts: Vec<PromptSpec>, runs_per_test: u32) -> Result<Self> {
        if models.is_empty() {
            return Err(RunnerError::InvalidPlan("no models selected".to_string()));
        }
        if models.iter().any(|m| m.trim().is_empty()) {
            return Err(RunnerError::InvalidPlan("empty model name".to_string()));
        }
        if prompts.is_empty() {
            return Err(RunnerError::InvalidPlan("no prompts selected".to_string()));
        }
        if runs_per_test == 0 {
            return Err(RunnerError::InvalidPlan("runs must be at least 1".to_string()));
        }

        let total_units = (models.len() as u64)
            .checked_mul(prompts.len() as u64)
            .and_then(|n| n.checked_mul(u64::from(runs_per_test)))
            .ok_or_else(|| RunnerError::InvalidPlan("too many benchmark units".to_string()))?;

        Ok(Self {
            models,
            prompts,
            runs_per_test,
            total_units,
        })
    }

    /// Build a plan from prompt ids looked up in `config`.
    ///
    /// Unknown ids are rejected. `runs` defaults to the configured default.
    pub fn from_ids(
        config: &BenchmarkConfig,
        models: Vec<String>,
        prompt_ids: &[String],
        runs: Option<u32>,
    ) -> Result<Self> {
        let prompts = prompt_ids
            .iter()
            .map(|id| {
                config
                    .prompt(id)
                    .cloned()
                    .ok_or_else(|| RunnerError::InvalidPlan(format!("unknown prompt: {}", id)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::new(models, prompts, runs.unwrap_or(config.default_runs))
    }

    /// Models in sweep order.
    pub fn models(&self) -> &[String] {
        &self.models
    }

    /// Prompts in sweep order.
    pub fn prompts(&self) -> &[PromptSpec] {
        &self.prompts
    }

    /// Runs per `(model, prompt)` pair.
    pub fn runs_per_test(&self) -> u32 {
        self.runs_per_test
    }

    /// `models × prompts × runs`.
    pub fn total_units(&self) -> u64 {
        self.total_units
    }
}

/// Tunables of the runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerSettings {
    /// Pause after unloading a model
    pub unload_settle: Duration,
    /// Abandon an in-flight generate call on cancellation
    pub abort_in_flight: bool,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            unload_settle: Duration::from_secs(1),
            abort_in_flight: false,
        }
    }
}

impl From<&BenchmarkConfig> for RunnerSettings {
    fn from(config: &BenchmarkConfig) -> Self {
        Self {
            unload_settle: config.unload_settle(),
            abort_in_flight: config.abort_in_flight,
        }
    }
}

/// Outcome of one unit.
enum UnitOutcome {
    Measured(MeasurementRecord),
    Failed,
    Aborted,
}

/// Executes benchmark sweeps against an [`InferenceBackend`].
pub struct BenchmarkRunner {
    backend: Arc<dyn InferenceBackend>,
    tracker: ProgressTracker,
    settings: RunnerSettings,
    latest: Mutex<Option<ResultSet>>,
}

impl std::fmt::Debug for BenchmarkRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkRunner")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl BenchmarkRunner {
    /// Create a runner reporting through `tracker`.
    pub fn new(
        backend: Arc<dyn InferenceBackend>,
        tracker: ProgressTracker,
        settings: RunnerSettings,
    ) -> Self {
        Self {
            backend,
            tracker,
            settings,
            latest: Mutex::new(None),
        }
    }

    /// Results of the last sweep that ran to completion.
    ///
    /// `None` before the first sweep, while a sweep runs and after a
    /// cancelled one.
    pub fn latest_results(&self) -> Option<ResultSet> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_latest(&self, results: Option<ResultSet>) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = results;
    }

    /// Start a sweep and run it to the end.
    ///
    /// Replaces whatever operation the tracker held.
    pub async fn run(&self, plan: SweepPlan) -> Result<ResultSet> {
        self.set_latest(None);
        self.tracker
            .start(OperationKind::Benchmark, "Initializing", plan.total_units());
        let token = self.tracker.cancellation_token();
        self.execute(plan, token).await
    }

    /// Claim the tracker and run the sweep on a background task.
    ///
    /// Fails with [`CoreError::OperationInProgress`] while another operation
    /// is running.
    pub fn spawn(self: Arc<Self>, plan: SweepPlan) -> Result<JoinHandle<Result<ResultSet>>> {
        self.tracker
            .try_start(OperationKind::Benchmark, "Initializing", plan.total_units())?;
        self.set_latest(None);
        let token = self.tracker.cancellation_token();
        Ok(tokio::spawn(async move { self.execute(plan, token).await }))
    }

    /// Run the sweep for an operation already started on the tracker.
    async fn execute(&self, plan: SweepPlan, token: CancellationToken) -> Result<ResultSet> {
        info!(
            models = plan.models().len(),
            prompts = plan.prompts().len(),
            runs = plan.runs_per_test(),
            total = plan.total_units(),
            "Benchmark sweep started"
        );

        match AssertUnwindSafe(self.sweep(&plan, &token)).catch_unwind().await {
            Ok(Some(results)) => {
                self.set_latest(Some(results.clone()));
                Ok(results)
            }
            Ok(None) => {
                info!("Benchmark sweep cancelled, results discarded");
                Ok(ResultSet::new())
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                self.tracker.error(format!("Benchmark failed: {}", reason));
                Err(RunnerError::Failed(reason))
            }
        }
    }

    /// Returns `None` when the sweep was cancelled.
    async fn sweep(&self, plan: &SweepPlan, token: &CancellationToken) -> Option<ResultSet> {
        let total = plan.total_units();
        let runs = plan.runs_per_test();
        let mut results = ResultSet::new();
        let mut completed: u64 = 0;

        for model in plan.models() {
            if token.is_cancelled() {
                return None;
            }

            self.unload(model).await;
            tokio::time::sleep(self.settings.unload_settle).await;

            self.tracker.update(
                ProgressUpdate::new(format!("Preparing {} - model will load on first test", model))
                    .current_item(model.as_str())
                    .completed(completed)
                    .total(total)
                    .metadata("model", model.as_str())
                    .metadata("status", "preparing"),
            );

            for (prompt_idx, prompt) in plan.prompts().iter().enumerate() {
                for run in 1..=runs {
                    if token.is_cancelled() {
                        return None;
                    }

                    if prompt_idx == 0 && run == 1 {
                        self.tracker.update(
                            ProgressUpdate::new(format!("Loading {} into memory...", model))
                                .current_item(format!("{} (Loading)", model))
                                .completed(completed)
                                .total(total)
                                .metadata("model", model.as_str())
                                .metadata("status", "loading"),
                        );
                    }

                    let label = format!("{} - {} (Run {}/{})", model, prompt.name, run, runs);
                    self.tracker.update(
                        ProgressUpdate::new(format!("Testing: {}", label))
                            .current_item(label.as_str())
                            .completed(completed)
                            .total(total)
                            .metadata("prompt_name", prompt.name.as_str())
                            .metadata("prompt_text", prompt_preview(&prompt.text))
                            .metadata("model", model.as_str())
                            .metadata("run", run)
                            .metadata("total_runs", runs),
                    );

                    let unit = BenchmarkUnit {
                        model: model.clone(),
                        prompt_id: prompt.id.clone(),
                        run_number: run,
                    };
                    match self.run_unit(&unit, &prompt.text, token).await {
                        UnitOutcome::Measured(record) => results.push(record),
                        UnitOutcome::Failed => {}
                        UnitOutcome::Aborted => return None,
                    }

                    completed += 1;
                    self.tracker.update(
                        ProgressUpdate::new(format!("Completed: {}", label))
                            .completed(completed)
                            .total(total),
                    );
                }
            }

            self.unload(model).await;
        }

        if token.is_cancelled() {
            return None;
        }

        self.tracker
            .complete(format!("Benchmark complete! Ran {} tests.", completed));
        info!(
            tests = completed,
            measured = results.len(),
            "Benchmark sweep complete"
        );
        Some(results)
    }

    async fn run_unit(
        &self,
        unit: &BenchmarkUnit,
        prompt_text: &str,
        token: &CancellationToken,
    ) -> UnitOutcome {
        let generated = if self.settings.abort_in_flight {
            tokio::select! {
                response = self.backend.generate(&unit.model, prompt_text) => response,
                _ = token.cancelled() => {
                    debug!(unit = %unit, "In-flight generate abandoned");
                    return UnitOutcome::Aborted;
                }
            }
        } else {
            self.backend.generate(&unit.model, prompt_text).await
        };

        let response = match generated {
            Ok(response) => response,
            Err(e) => {
                warn!(unit = %unit, error = %e, "Benchmark unit failed, skipping");
                metrics::counter!("ollamometer_units_failed_total", "model" => unit.model.clone())
                    .increment(1);
                return UnitOutcome::Failed;
            }
        };

        let memory = match self.backend.list_loaded_models().await {
            Ok(loaded) => loaded.into_iter().find(|m| m.matches(&unit.model)),
            Err(e) => {
                warn!(unit = %unit, error = %e, "Memory lookup failed, recording zero");
                None
            }
        };

        let record = MeasurementRecord::capture(unit, prompt_text, &response, memory.as_ref());
        let derived = record.derived();
        debug!(
            unit = %unit,
            tokens_per_second = derived.tokens_per_second,
            compute_mode = %derived.compute_mode,
            "Benchmark unit measured"
        );
        metrics::counter!("ollamometer_units_completed_total", "model" => unit.model.clone())
            .increment(1);
        metrics::histogram!("ollamometer_tokens_per_second", "model" => unit.model.clone())
            .record(derived.tokens_per_second);

        UnitOutcome::Measured(record)
    }

    async fn unload(&self, model: &str) {
        if let Err(e) = self.backend.unload(model).await {
            warn!(model = %model, error = %e, "Unload failed, continuing");
        }
    }
}

fn prompt_preview(text: &str) -> String {
    match text.char_indices().nth(PROMPT_PREVIEW_CHARS) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
