// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ollamometer API server entry point.

use ollamometer_core::config::AppConfig;
use ollamometer_core::telemetry::{init_tracing, LogFormat};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let format = std::env::var("OLLAMOMETER_LOG_FORMAT")
        .ok()
        .and_then(|f| f.parse().ok())
        .unwrap_or(LogFormat::Pretty);
    init_tracing(format, "info")?;

    let config = AppConfig::load(None)?;
    ollamometer_api::serve(config).await
}
