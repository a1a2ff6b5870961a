// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Raw measurements captured for each benchmark unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{GenerateResponse, LoadedModel};
use crate::metrics::DerivedMetrics;

/// Identity of one unit of work: a single inference for a
/// `(model, prompt, run)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BenchmarkUnit {
    /// Model identifier
    pub model: String,
    /// Prompt identifier
    pub prompt_id: String,
    /// 1-based run number
    pub run_number: u32,
}

impl std::fmt::Display for BenchmarkUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}#{}", self.model, self.prompt_id, self.run_number)
    }
}

/// Immutable result of one benchmark unit.
///
/// Holds ground truth only. Throughput, latency and compute-mode figures are
/// derived on demand through [`MeasurementRecord::derived`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeasurementRecord {
    /// Model identifier
    pub model: String,
    /// Prompt identifier
    pub prompt_id: String,
    /// Prompt text sent to the model
    pub prompt_text: String,
    /// 1-based run number
    pub run_number: u32,
    /// Total request duration (ns)
    pub total_duration_ns: u64,
    /// Model load duration (ns)
    pub load_duration_ns: u64,
    /// Prompt tokens evaluated
    pub prompt_eval_count: u64,
    /// Prompt evaluation duration (ns)
    pub prompt_eval_duration_ns: u64,
    /// Tokens generated
    pub eval_count: u64,
    /// Generation duration (ns)
    pub eval_duration_ns: u64,
    /// Total resident model size (bytes)
    pub model_size_bytes: u64,
    /// Accelerator-resident model size (bytes)
    pub model_size_vram_bytes: u64,
    /// Capture time
    pub timestamp: DateTime<Utc>,
}

impl MeasurementRecord {
    /// Build a record from a generate response and the matching loaded-model
    /// entry, if any. Missing memory information is recorded as zero.
    pub fn capture(
        unit: &BenchmarkUnit,
        prompt_text: impl Into<String>,
        response: &GenerateResponse,
        memory: Option<&LoadedModel>,
    ) -> Self {
        Self {
            model: unit.model.clone(),
            prompt_id: unit.prompt_id.clone(),
            prompt_text: prompt_text.into(),
            run_number: unit.run_number,
            total_duration_ns: response.total_duration_ns,
            load_duration_ns: response.load_duration_ns,
            prompt_eval_count: response.prompt_eval_count,
            prompt_eval_duration_ns: response.prompt_eval_duration_ns,
            eval_count: response.eval_count,
            eval_duration_ns: response.eval_duration_ns,
            model_size_bytes: memory.map_or(0, |m| m.size_bytes),
            model_size_vram_bytes: memory.map_or(0, |m| m.size_vram_bytes),
            timestamp: Utc::now(),
        }
    }

    /// The unit this record measured.
    pub fn unit(&self) -> BenchmarkUnit {
        BenchmarkUnit {
            model: self.model.clone(),
            prompt_id: self.prompt_id.clone(),
            run_number: self.run_number,
        }
    }

    /// Derived performance metrics for this record.
    pub fn derived(&self) -> DerivedMetrics {
        DerivedMetrics::from_record(self)
    }
}

/// Ordered, append-only collection of records for one sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet {
    records: Vec<MeasurementRecord>,
}

impl ResultSet {
    /// Create an empty result set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: MeasurementRecord) {
        self.records.push(record);
    }

    /// Records in capture order.
    pub fn records(&self) -> &[MeasurementRecord] {
        &self.records
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no record was captured.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl FromIterator<MeasurementRecord> for ResultSet {
    fn from_iter<I: IntoIterator<Item = MeasurementRecord>>(iter: I) -> Self {
        Self {
            records: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> BenchmarkUnit {
        BenchmarkUnit {
            model: "llama3.2:1b".to_string(),
            prompt_id: "quick_qa".to_string(),
            run_number: 2,
        }
    }

    #[test]
    fn test_capture_copies_raw_fields() {
        let response = GenerateResponse {
            total_duration_ns: 5_000_000_000,
            load_duration_ns: 1_000_000_000,
            prompt_eval_count: 12,
            prompt_eval_duration_ns: 200_000_000,
            eval_count: 100,
            eval_duration_ns: 2_000_000_000,
        };
        let memory = LoadedModel {
            name: "llama3.2:1b".to_string(),
            size_bytes: 2048,
            size_vram_bytes: 1024,
        };

        let record = MeasurementRecord::capture(&unit(), "hello", &response, Some(&memory));

        assert_eq!(record.model, "llama3.2:1b");
        assert_eq!(record.run_number, 2);
        assert_eq!(record.eval_count, 100);
        assert_eq!(record.model_size_bytes, 2048);
        assert_eq!(record.model_size_vram_bytes, 1024);
        assert_eq!(record.unit(), unit());
    }

    #[test]
    fn test_capture_without_memory_defaults_to_zero() {
        let record =
            MeasurementRecord::capture(&unit(), "hello", &GenerateResponse::default(), None);
        assert_eq!(record.model_size_bytes, 0);
        assert_eq!(record.model_size_vram_bytes, 0);
    }

    #[test]
    fn test_unit_display() {
        assert_eq!(unit().to_string(), "llama3.2:1b/quick_qa#2");
    }
}
