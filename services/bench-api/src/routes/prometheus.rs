// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::{extract::State, http::header, response::IntoResponse, routing::get, Router};
use std::sync::Arc;

use crate::state::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(render_metrics))
}

async fn render_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
