// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Shared application state.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use ollamometer_benchmarks::{BenchmarkRunner, PullTask, RunnerSettings};
use ollamometer_core::{AppConfig, InferenceBackend, ProgressTracker};

/// Everything a handler needs. The tracker is the only channel between
/// request handlers and background operations.
pub struct AppState {
    pub config: AppConfig,
    pub backend: Arc<dyn InferenceBackend>,
    pub tracker: ProgressTracker,
    pub runner: Arc<BenchmarkRunner>,
    pub pull: PullTask,
    pub metrics: PrometheusHandle,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn InferenceBackend>,
        metrics: PrometheusHandle,
    ) -> Self {
        let tracker = ProgressTracker::new();
        let runner = Arc::new(BenchmarkRunner::new(
            backend.clone(),
            tracker.clone(),
            RunnerSettings::from(&config.benchmark),
        ));
        let pull = PullTask::new(backend.clone(), tracker.clone());

        Self {
            config,
            backend,
            tracker,
            runner,
            pull,
            metrics,
        }
    }
}
