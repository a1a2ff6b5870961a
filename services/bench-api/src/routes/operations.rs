// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, routing::post, Json, Router};
use ollamometer_benchmarks::SweepPlan;
use ollamometer_core::PromptSpec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PullRequest {
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct PullStarted {
    pub message: &'static str,
    pub model: String,
}

#[derive(Debug, Deserialize)]
pub struct BenchmarkRequest {
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default)]
    pub runs: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct BenchmarkStarted {
    pub message: &'static str,
    pub models: Vec<String>,
    pub prompts: Vec<String>,
    pub runs: u32,
    pub total_tests: u64,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub message: &'static str,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/pull", post(start_pull))
        .route("/api/benchmark", post(start_benchmark))
        .route("/api/benchmark/cancel", post(cancel_operation))
}

fn busy() -> ApiError {
    ApiError::conflict("Another operation is already running")
}

async fn start_pull(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PullRequest>,
) -> Result<Json<PullStarted>, ApiError> {
    let model = request
        .model
        .filter(|m| !m.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("MISSING_MODEL", "Model name required"))?;

    if state.tracker.is_running() {
        return Err(busy());
    }
    state.pull.spawn(model.clone())?;

    info!(model = %model, "Pull started");
    Ok(Json(PullStarted {
        message: "Pull started",
        model,
    }))
}

async fn start_benchmark(
    State(state): State<Arc<AppState>>,
    Json(request): Json<BenchmarkRequest>,
) -> Result<Json<BenchmarkStarted>, ApiError> {
    if request.models.is_empty() {
        return Err(ApiError::bad_request("MISSING_MODELS", "No models specified"));
    }
    if request.prompts.is_empty() {
        return Err(ApiError::bad_request("MISSING_PROMPTS", "No prompts specified"));
    }
    if state.tracker.is_running() {
        return Err(busy());
    }

    // Unknown prompt ids are ignored as long as one remains.
    let prompts: Vec<PromptSpec> = request
        .prompts
        .iter()
        .filter_map(|id| state.config.benchmark.prompt(id).cloned())
        .collect();
    if prompts.is_empty() {
        return Err(ApiError::bad_request("INVALID_PROMPTS", "No valid prompts found"));
    }

    let runs = request.runs.unwrap_or(state.config.benchmark.default_runs);
    let plan = SweepPlan::new(request.models.clone(), prompts, runs)?;
    let total_tests = plan.total_units();
    state.runner.clone().spawn(plan)?;

    info!(
        models = ?request.models,
        prompts = ?request.prompts,
        runs,
        total_tests,
        "Benchmark started"
    );
    Ok(Json(BenchmarkStarted {
        message: "Benchmark started",
        models: request.models,
        prompts: request.prompts,
        runs,
        total_tests,
    }))
}

async fn cancel_operation(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CancelResponse>, ApiError> {
    if !state.tracker.cancel() {
        return Err(ApiError::bad_request(
            "NO_OPERATION",
            "No benchmark is currently running",
        ));
    }
    Ok(Json(CancelResponse {
        message: "Benchmark cancellation requested",
    }))
}
