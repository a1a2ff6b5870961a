// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Request logging middleware.
//!
//! Logs one line per request with method, route, status and latency, and
//! records the same figures as Prometheus metrics. Server errors are logged
//! at `warn`.

use std::time::Instant;

use axum::{extract::MatchedPath, extract::Request, middleware::Next, response::Response};
use tracing::{info, warn};

pub async fn request_logging_middleware(req: Request, next: Next) -> Response {
    let started = Instant::now();
    let method = req.method().clone();
    // Use the route template so path parameters do not explode label sets.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| req.uri().path().to_string());

    let response = next.run(req).await;

    let status = response.status();
    let elapsed = started.elapsed();
    if status.is_server_error() {
        warn!(
            method = %method,
            route = %route,
            status = status.as_u16(),
            latency_ms = elapsed.as_millis() as u64,
            "Request failed"
        );
    } else {
        info!(
            method = %method,
            route = %route,
            status = status.as_u16(),
            latency_ms = elapsed.as_millis() as u64,
            "Request handled"
        );
    }

    metrics::counter!(
        "ollamometer_http_requests_total",
        "method" => method.to_string(),
        "route" => route.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    metrics::histogram!("ollamometer_http_request_duration_seconds", "route" => route)
        .record(elapsed.as_secs_f64());

    response
}
