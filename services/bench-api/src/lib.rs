// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP API for Ollamometer.
//!
//! # Routes
//!
//! | Method | Path | Purpose |
//! |--------|------|---------|
//! | GET | `/api/status` | backend reachability |
//! | GET | `/api/models` | configured models and download state |
//! | GET | `/api/prompts` | prompt catalogue and run options |
//! | POST | `/api/pull` | start a model download |
//! | POST | `/api/benchmark` | start a benchmark sweep |
//! | POST | `/api/benchmark/cancel` | cancel the running operation |
//! | GET | `/api/results` | report of the last finished sweep |
//! | GET | `/api/progress` | server-sent progress events |
//! | GET | `/metrics` | Prometheus exposition |
//!
//! Starting an operation while another runs yields `409 Conflict`.

pub mod error;
pub mod middleware;
pub mod routes;
pub mod state;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::Router;
use metrics_exporter_prometheus::PrometheusBuilder;
use ollamometer_adapters::OllamaClient;
use ollamometer_core::{AppConfig, ProgressTracker};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

pub use error::ApiError;
pub use state::AppState;

/// Build the router over `state`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(routes::status::routes())
        .merge(routes::operations::routes())
        .merge(routes::results::routes())
        .merge(routes::progress::routes())
        .merge(routes::prometheus::routes())
        .layer(axum::middleware::from_fn(
            middleware::request_logging_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the API server until Ctrl-C.
///
/// Installs the global Prometheus recorder, so call it at most once per
/// process.
pub async fn serve(config: AppConfig) -> anyhow::Result<()> {
    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;
    let backend = OllamaClient::with_availability_timeout(
        config.backend.base_url.as_str(),
        Duration::from_secs(config.backend.availability_timeout_secs),
    )?;

    let address = config.bind_address();
    let state = Arc::new(AppState::new(config, Arc::new(backend), metrics));
    let tracker = state.tracker.clone();

    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind {}", address))?;
    info!(address = %address, "Ollamometer API listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal(tracker))
        .await
        .context("server error")?;

    info!("Ollamometer API stopped");
    Ok(())
}

async fn shutdown_signal(tracker: ProgressTracker) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Could not listen for Ctrl-C");
        futures::future::pending::<()>().await;
    }
    if tracker.cancel() {
        info!("Cancelled running operation on shutdown");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use ollamometer_benchmarks::SweepPlan;
    use ollamometer_core::backend::{
        BackendResult, GenerateResponse, InferenceBackend, LoadedModel, PullProgress,
    };
    use ollamometer_core::{OperationStatus, PromptSpec};
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::ServiceExt;

    struct FakeBackend {
        block_generate: bool,
    }

    #[async_trait]
    impl InferenceBackend for FakeBackend {
        async fn is_available(&self) -> bool {
            true
        }

        async fn list_models(&self) -> BackendResult<Vec<String>> {
            Ok(vec!["llama3.2:1b".to_string()])
        }

        async fn generate(&self, _model: &str, _prompt: &str) -> BackendResult<GenerateResponse> {
            if self.block_generate {
                futures::future::pending::<()>().await;
            }
            Ok(GenerateResponse {
                eval_count: 20,
                eval_duration_ns: 1_000_000_000,
                ..Default::default()
            })
        }

        async fn unload(&self, _model: &str) -> BackendResult<()> {
            Ok(())
        }

        async fn list_loaded_models(&self) -> BackendResult<Vec<LoadedModel>> {
            Ok(vec![])
        }

        async fn pull(
            &self,
            _model: &str,
            _progress: mpsc::UnboundedSender<PullProgress>,
        ) -> BackendResult<()> {
            futures::future::pending::<()>().await;
            Ok(())
        }
    }

    fn state(block_generate: bool) -> Arc<AppState> {
        let mut config = AppConfig::default();
        config.benchmark.unload_settle_ms = 0;
        config.stream.terminal_grace_ms = 0;
        config.stream.poll_interval_ms = 10;
        let metrics = PrometheusBuilder::new().build_recorder().handle();
        Arc::new(AppState::new(
            config,
            Arc::new(FakeBackend { block_generate }),
            metrics,
        ))
    }

    async fn send(state: &Arc<AppState>, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app(state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body.to_vec())
    }

    async fn get(state: &Arc<AppState>, uri: &str) -> (StatusCode, Value) {
        let request = Request::get(uri).body(Body::empty()).unwrap();
        let (status, body) = send(state, request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    async fn post(state: &Arc<AppState>, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let (status, body) = send(state, request).await;
        (status, serde_json::from_slice(&body).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_status_and_models() {
        let state = state(false);

        let (status, body) = get(&state, "/api/status").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ollama_available"], true);

        let (status, body) = get(&state, "/api/models").await;
        assert_eq!(status, StatusCode::OK);
        let models = body["models"].as_array().unwrap();
        assert_eq!(models.len(), 4);
        assert_eq!(
            models[0],
            json!({"name": "llama3.2:1b", "downloaded": true, "size": null})
        );
        assert_eq!(models[1]["downloaded"], false);
        assert!(models[1].as_object().unwrap().contains_key("size"));
    }

    #[tokio::test]
    async fn test_prompts_catalogue() {
        let (status, body) = get(&state(false), "/api/prompts").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prompts"].as_array().unwrap().len(), 5);
        assert_eq!(body["prompts"][0]["id"], "quick_qa");
        assert_eq!(body["default_runs"], 3);
    }

    #[tokio::test]
    async fn test_benchmark_validation() {
        let state = state(false);

        let (status, body) = post(&state, "/api/benchmark", json!({"prompts": ["quick_qa"]})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "MISSING_MODELS");
        assert!(body["meta"]["timestamp"].is_string());

        let (status, _) = post(&state, "/api/benchmark", json!({"models": ["m"]})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = post(
            &state,
            "/api/benchmark",
            json!({"models": ["m"], "prompts": ["nope"]}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "No valid prompts found");

        let (status, _) = post(
            &state,
            "/api/benchmark",
            json!({"models": ["m"], "prompts": ["quick_qa"], "runs": 0}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(state.tracker.read().is_none());
    }

    #[tokio::test]
    async fn test_second_start_conflicts_and_cancel_works() {
        let state = state(true);

        let (status, body) = post(
            &state,
            "/api/benchmark",
            json!({"models": ["a", "b"], "prompts": ["quick_qa", "nope", "reasoning"], "runs": 2}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_tests"], 8);

        let (status, body) = post(
            &state,
            "/api/benchmark",
            json!({"models": ["a"], "prompts": ["quick_qa"]}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "OPERATION_IN_PROGRESS");

        let (status, _) = post(&state, "/api/pull", json!({"model": "x"})).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = post(&state, "/api/benchmark/cancel", json!({})).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            state.tracker.read().unwrap().status,
            OperationStatus::Cancelled
        );

        let (status, _) = post(&state, "/api/benchmark/cancel", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_bad_request() {
        let (status, body) = post(&state(false), "/api/benchmark/cancel", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "NO_OPERATION");
    }

    #[tokio::test]
    async fn test_pull_requires_model() {
        let (status, body) = post(&state(false), "/api/pull", json!({"model": ""})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["message"], "Model name required");
    }

    #[tokio::test]
    async fn test_results_before_and_after_a_sweep() {
        let state = state(false);

        let (status, body) = get(&state, "/api/results").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "NO_RESULTS");

        let plan = SweepPlan::new(
            vec!["m".to_string()],
            vec![PromptSpec::new("p", "P", "text")],
            2,
        )
        .unwrap();
        state.runner.run(plan).await.unwrap();

        let (status, body) = get(&state, "/api/results").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total_tests"], 2);
        assert_eq!(body["results"][0]["tokens_per_second"], 20.0);
        assert_eq!(body["system_info"]["name"], "my-pc");
    }

    #[tokio::test]
    async fn test_progress_stream_when_idle() {
        let state = state(false);
        let request = Request::get("/api/progress").body(Body::empty()).unwrap();
        let (status, body) = send(&state, request).await;

        assert_eq!(status, StatusCode::OK);
        let text = String::from_utf8(body).unwrap();
        assert_eq!(text, "data: {\"status\":\"idle\"}\n\n");
    }

    #[tokio::test]
    async fn test_progress_stream_ends_with_terminal_state() {
        let state = state(false);
        let plan = SweepPlan::new(
            vec!["m".to_string()],
            vec![PromptSpec::new("p", "P", "text")],
            1,
        )
        .unwrap();
        state.runner.run(plan).await.unwrap();

        let request = Request::get("/api/progress").body(Body::empty()).unwrap();
        let (_, body) = send(&state, request).await;
        let text = String::from_utf8(body).unwrap();

        let frames: Vec<&str> = text.split("\n\n").filter(|f| !f.is_empty()).collect();
        assert_eq!(frames.len(), 1);
        let payload: Value = serde_json::from_str(frames[0].trim_start_matches("data: ")).unwrap();
        assert_eq!(payload["status"], "complete");
        assert_eq!(payload["operation"], "benchmark");
    }

    #[tokio::test]
    async fn test_metrics_endpoint() {
        let request = Request::get("/metrics").body(Body::empty()).unwrap();
        let (status, _) = send(&state(false), request).await;
        assert_eq!(status, StatusCode::OK);
    }
}
