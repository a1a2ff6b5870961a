// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, routing::get, Json, Router};
use ollamometer_benchmarks::BenchmarkReport;
use std::sync::Arc;

use crate::error::ApiError;
use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/results", get(get_results))
}

async fn get_results(State(state): State<Arc<AppState>>) -> Result<Json<BenchmarkReport>, ApiError> {
    let results = state
        .runner
        .latest_results()
        .ok_or_else(|| ApiError::not_found("NO_RESULTS", "No benchmark has been run yet"))?;

    if results.is_empty() {
        return Err(ApiError::not_found("NO_RESULTS", "No results available"));
    }

    Ok(Json(BenchmarkReport::new(
        state.config.system_info.clone(),
        &results,
    )))
}
