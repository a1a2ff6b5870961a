// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Report types.
//!
//! A [`BenchmarkReport`] is the serialized view of one finished sweep: every
//! record with its derived metrics flattened alongside the raw fields, plus
//! the free-form description of the machine under test.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ollamometer_core::{ComputeMode, DerivedMetrics, MeasurementRecord, ResultSet};
use serde::{Deserialize, Serialize};

/// One record with its derived metrics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEntry {
    /// Raw measurement
    #[serde(flatten)]
    pub record: MeasurementRecord,
    /// Metrics derived from `record`
    #[serde(flatten)]
    pub derived: DerivedMetrics,
}

impl From<&MeasurementRecord> for ResultEntry {
    fn from(record: &MeasurementRecord) -> Self {
        Self {
            record: record.clone(),
            derived: record.derived(),
        }
    }
}

/// Serialized outcome of one benchmark sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Description of the machine under test
    pub system_info: BTreeMap<String, serde_json::Value>,
    /// Entries in capture order
    pub results: Vec<ResultEntry>,
    /// Number of entries
    pub total_tests: usize,
    /// When the report was built
    pub generated_at: DateTime<Utc>,
}

impl BenchmarkReport {
    /// Build a report from a finished result set.
    pub fn new(system_info: BTreeMap<String, serde_json::Value>, results: &ResultSet) -> Self {
        let results: Vec<ResultEntry> = results.records().iter().map(ResultEntry::from).collect();
        Self {
            system_info,
            total_tests: results.len(),
            results,
            generated_at: Utc::now(),
        }
    }

    /// Distinct models in first-seen order.
    pub fn models(&self) -> Vec<&str> {
        let mut models: Vec<&str> = Vec::new();
        for entry in &self.results {
            if !models.contains(&entry.record.model.as_str()) {
                models.push(&entry.record.model);
            }
        }
        models
    }

    /// Entries measured on `model`.
    pub fn entries_for<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a ResultEntry> + 'a {
        self.results.iter().filter(move |e| e.record.model == model)
    }

    /// Per-model averages in first-seen model order.
    pub fn model_summaries(&self) -> Vec<ModelSummary> {
        self.models()
            .into_iter()
            .filter_map(|model| ModelSummary::from_entries(model, self.entries_for(model)))
            .collect()
    }
}

/// Averages over every entry of one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    /// Model identifier
    pub model: String,
    /// Number of entries averaged
    pub tests: usize,
    /// Mean generation throughput
    pub avg_tokens_per_second: f64,
    /// Mean time to first token, in seconds
    pub avg_time_to_first_token_s: f64,
    /// Compute mode of the last entry
    pub compute_mode: ComputeMode,
}

impl ModelSummary {
    fn from_entries<'a>(model: &str, entries: impl Iterator<Item = &'a ResultEntry>) -> Option<Self> {
        let mut tests = 0usize;
        let mut tps = 0.0;
        let mut ttft = 0.0;
        let mut mode = None;
        for entry in entries {
            tests += 1;
            tps += entry.derived.tokens_per_second;
            ttft += entry.derived.time_to_first_token_s;
            mode = Some(entry.derived.compute_mode);
        }

        Some(Self {
            model: model.to_string(),
            tests,
            avg_tokens_per_second: tps / tests as f64,
            avg_time_to_first_token_s: ttft / tests as f64,
            compute_mode: mode?,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ollamometer_core::{BenchmarkUnit, GenerateResponse, LoadedModel};

    pub(crate) fn record(model: &str, prompt: &str, run: u32, eval_count: u64) -> MeasurementRecord {
        let unit = BenchmarkUnit {
            model: model.to_string(),
            prompt_id: prompt.to_string(),
            run_number: run,
        };
        let response = GenerateResponse {
            total_duration_ns: 2_000_000_000,
            load_duration_ns: 500_000_000,
            prompt_eval_count: 10,
            prompt_eval_duration_ns: 500_000_000,
            eval_count,
            eval_duration_ns: 1_000_000_000,
        };
        let memory = LoadedModel {
            name: model.to_string(),
            size_bytes: 1024 * 1024 * 100,
            size_vram_bytes: 1024 * 1024 * 100,
        };
        MeasurementRecord::capture(&unit, "prompt text", &response, Some(&memory))
    }

    #[test]
    fn test_report_flattens_derived_fields() {
        let set: ResultSet = vec![record("m1", "p1", 1, 40)].into_iter().collect();
        let report = BenchmarkReport::new(BTreeMap::new(), &set);
        assert_eq!(report.total_tests, 1);

        let json = serde_json::to_value(&report).unwrap();
        let entry = &json["results"][0];
        assert_eq!(entry["model"], "m1");
        assert_eq!(entry["eval_count"], 40);
        assert_eq!(entry["tokens_per_second"], 40.0);
        assert_eq!(entry["time_to_first_token_s"], 1.0);
        assert_eq!(entry["compute_mode"], "Full-accelerator");
    }

    #[test]
    fn test_model_summaries_average_per_model() {
        let set: ResultSet = vec![
            record("m1", "p1", 1, 40),
            record("m2", "p1", 1, 10),
            record("m1", "p1", 2, 60),
        ]
        .into_iter()
        .collect();
        let report = BenchmarkReport::new(BTreeMap::new(), &set);

        assert_eq!(report.models(), vec!["m1", "m2"]);
        let summaries = report.model_summaries();
        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].tests, 2);
        assert!((summaries[0].avg_tokens_per_second - 50.0).abs() < 1e-9);
        assert!((summaries[1].avg_tokens_per_second - 10.0).abs() < 1e-9);
    }
}
