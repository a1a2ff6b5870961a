// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Benchmark orchestration and reports for Ollamometer.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use ollamometer_benchmarks::{io, BenchmarkReport, BenchmarkRunner, RunnerSettings, SweepPlan};
//!
//! let runner = BenchmarkRunner::new(backend, tracker, RunnerSettings::default());
//! let plan = SweepPlan::from_ids(&config.benchmark, models, &prompt_ids, Some(3))?;
//! let results = runner.run(plan).await?;
//!
//! let report = BenchmarkReport::new(config.system_info.clone(), &results);
//! io::write_all_outputs(&report, io::OUTPUT_DIR)?;
//! ```
//!
//! # Modules
//!
//! - [`runner`] - the sweep orchestrator
//! - [`pull`] - model download as a tracked operation
//! - [`result`] - the serialized report
//! - [`io`] - reading and writing reports
//! - [`markdown`] - Markdown summary generation

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod io;
pub mod markdown;
pub mod pull;
pub mod result;
pub mod runner;

pub use pull::PullTask;
pub use result::{BenchmarkReport, ModelSummary, ResultEntry};
pub use runner::{BenchmarkRunner, RunnerError, RunnerSettings, SweepPlan};
