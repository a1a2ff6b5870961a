// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Core types for Ollamometer.
//!
//! This crate holds the pieces every other crate builds on:
//!
//! - [`progress`] - the shared [`ProgressTracker`] for the single current
//!   operation
//! - [`stream`] - [`ProgressStream`], the per-observer snapshot-and-diff feed
//! - [`metrics`] - pure metric derivation for measurement records
//! - [`measurement`] - [`MeasurementRecord`] and [`ResultSet`]
//! - [`backend`] - the [`InferenceBackend`] contract
//! - [`config`] - layered application configuration
//! - [`telemetry`] - tracing subscriber setup

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod backend;
pub mod config;
pub mod error;
pub mod measurement;
pub mod metrics;
pub mod progress;
pub mod stream;
pub mod telemetry;

pub use backend::{BackendError, GenerateResponse, InferenceBackend, LoadedModel, PullProgress};
pub use config::{AppConfig, PromptSpec};
pub use error::{CoreError, Result};
pub use measurement::{BenchmarkUnit, MeasurementRecord, ResultSet};
pub use metrics::{ComputeMode, DerivedMetrics};
pub use progress::{
    OperationKind, OperationState, OperationStatus, ProgressTracker, ProgressUpdate,
};
pub use stream::{ProgressEvent, ProgressStream, StreamSettings};
