// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

use axum::{
    extract::State,
    http::{header, HeaderName},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::get,
    Router,
};
use futures::StreamExt;
use ollamometer_core::{ProgressEvent, ProgressStream};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::state::AppState;

static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/progress", get(progress_stream))
}

fn to_event(event: &ProgressEvent) -> Event {
    match event.to_sse_data() {
        Ok(data) => Event::default().data(data),
        Err(e) => {
            warn!(error = %e, "Could not serialize progress event");
            Event::default().comment("serialization error")
        }
    }
}

async fn progress_stream(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    debug!("Progress observer connected");
    let events = ProgressStream::new(state.tracker.clone(), state.config.stream.settings())
        .into_stream()
        .map(|event| Ok::<_, Infallible>(to_event(&event)));

    (
        [
            (header::CACHE_CONTROL, "no-cache"),
            (X_ACCEL_BUFFERING.clone(), "no"),
        ],
        Sse::new(events).keep_alive(KeepAlive::default()),
    )
}
