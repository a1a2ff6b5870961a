// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, routing::get, Json, Router};
use ollamometer_core::PromptSpec;
use serde::Serialize;
use std::sync::Arc;
use tracing::warn;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub ollama_available: bool,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub name: String,
    pub downloaded: bool,
    /// Size in bytes when known, otherwise `null`
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct ModelsResponse {
    pub models: Vec<ModelStatus>,
}

#[derive(Debug, Serialize)]
pub struct PromptsResponse {
    pub prompts: Vec<PromptSpec>,
    pub runs_options: Vec<u32>,
    pub default_runs: u32,
}

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/status", get(check_status))
        .route("/api/models", get(list_models))
        .route("/api/prompts", get(list_prompts))
}

async fn check_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let available = state.backend.is_available().await;
    Json(StatusResponse {
        ollama_available: available,
        message: if available {
            "Ollama is running"
        } else {
            "Ollama is not available"
        },
    })
}

async fn list_models(State(state): State<Arc<AppState>>) -> Json<ModelsResponse> {
    let downloaded = match state.backend.list_models().await {
        Ok(models) => models,
        Err(e) => {
            warn!(error = %e, "Could not list downloaded models");
            Vec::new()
        }
    };

    let models = state
        .config
        .benchmark
        .available_models
        .iter()
        .map(|name| ModelStatus {
            name: name.clone(),
            downloaded: downloaded.contains(name),
            size: None,
        })
        .collect();

    Json(ModelsResponse { models })
}

async fn list_prompts(State(state): State<Arc<AppState>>) -> Json<PromptsResponse> {
    let benchmark = &state.config.benchmark;
    Json(PromptsResponse {
        prompts: benchmark.prompts.clone(),
        runs_options: benchmark.runs_options.clone(),
        default_runs: benchmark.default_runs,
    })
}
