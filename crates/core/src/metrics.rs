// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Metric derivation for measurement records.
//!
//! Everything here is a pure function of a [`MeasurementRecord`]. No state,
//! no I/O, no error conditions.

use serde::{Deserialize, Serialize};

use crate::measurement::MeasurementRecord;

const NANOS_PER_SECOND: f64 = 1e9;
const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Accelerator share at or above which a model counts as fully offloaded.
pub const FULL_OFFLOAD_RATIO: f64 = 0.95;

/// Where a model's weights reside while serving.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComputeMode {
    /// No accelerator memory in use
    #[serde(rename = "CPU-only")]
    CpuOnly,
    /// At least 95% of the model resides on the accelerator
    #[serde(rename = "Full-accelerator")]
    FullAccelerator,
    /// Split between accelerator and system memory
    #[serde(rename = "Hybrid")]
    Hybrid,
}

impl ComputeMode {
    /// Classify a model from its total and accelerator-resident sizes,
    /// expressed in the same unit.
    ///
    /// The 5% band absorbs small reporting differences between the two
    /// figures so near-complete offload is not reported as hybrid.
    pub fn classify(total: f64, accelerator: f64) -> Self {
        if accelerator == 0.0 {
            ComputeMode::CpuOnly
        } else if accelerator >= total * FULL_OFFLOAD_RATIO {
            ComputeMode::FullAccelerator
        } else {
            ComputeMode::Hybrid
        }
    }

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            ComputeMode::CpuOnly => "CPU-only",
            ComputeMode::FullAccelerator => "Full-accelerator",
            ComputeMode::Hybrid => "Hybrid",
        }
    }
}

impl std::fmt::Display for ComputeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Tokens per second for `count` tokens over `duration_ns`, 0 when the
/// duration is 0.
pub fn tokens_per_second(count: u64, duration_ns: u64) -> f64 {
    if duration_ns == 0 {
        return 0.0;
    }
    count as f64 / (duration_ns as f64 / NANOS_PER_SECOND)
}

/// Nanoseconds to seconds.
pub fn ns_to_secs(ns: u64) -> f64 {
    ns as f64 / NANOS_PER_SECOND
}

/// Bytes to mebibytes.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

/// Metrics derived from one [`MeasurementRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    /// Total duration in seconds
    pub total_duration_s: f64,
    /// Load duration in seconds
    pub load_duration_s: f64,
    /// Prompt evaluation duration in seconds
    pub prompt_eval_duration_s: f64,
    /// Generation duration in seconds
    pub eval_duration_s: f64,
    /// Generation throughput
    pub tokens_per_second: f64,
    /// Prompt processing throughput
    pub prompt_tokens_per_second: f64,
    /// Load plus prompt evaluation, in seconds
    pub time_to_first_token_s: f64,
    /// Total model size in MB
    pub model_size_mb: f64,
    /// Accelerator-resident model size in MB
    pub model_size_vram_mb: f64,
    /// Memory placement classification
    pub compute_mode: ComputeMode,
}

impl DerivedMetrics {
    /// Derive all metrics for `record`.
    pub fn from_record(record: &MeasurementRecord) -> Self {
        Self {
            total_duration_s: ns_to_secs(record.total_duration_ns),
            load_duration_s: ns_to_secs(record.load_duration_ns),
            prompt_eval_duration_s: ns_to_secs(record.prompt_eval_duration_ns),
            eval_duration_s: ns_to_secs(record.eval_duration_ns),
            tokens_per_second: tokens_per_second(record.eval_count, record.eval_duration_ns),
            prompt_tokens_per_second: tokens_per_second(
                record.prompt_eval_count,
                record.prompt_eval_duration_ns,
            ),
            time_to_first_token_s: ns_to_secs(
                record
                    .load_duration_ns
                    .saturating_add(record.prompt_eval_duration_ns),
            ),
            model_size_mb: bytes_to_mb(record.model_size_bytes),
            model_size_vram_mb: bytes_to_mb(record.model_size_vram_bytes),
            compute_mode: ComputeMode::classify(
                record.model_size_bytes as f64,
                record.model_size_vram_bytes as f64,
            ),
        }
    }
}
