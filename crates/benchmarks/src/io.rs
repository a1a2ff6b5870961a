// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! I/O operations for benchmark reports.
//!
//! Layout under the output directory:
//!
//! - `raw/<model>.json` - entries of one model
//! - `all_results.json` - the complete report
//! - `summary.md` - Markdown summary

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::markdown;
use crate::result::{BenchmarkReport, ResultEntry};

/// Default output directory.
pub const OUTPUT_DIR: &str = "results";

/// Sub-directory for per-model files.
pub const RAW_DIR: &str = "raw";

/// Combined report file name.
pub const ALL_RESULTS_FILE: &str = "all_results.json";

/// Markdown summary file name.
pub const SUMMARY_FILE: &str = "summary.md";

fn to_io_error(e: serde_json::Error) -> io::Error {
    io::Error::new(io::ErrorKind::Other, e)
}

fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> io::Result<()> {
    let json = serde_json::to_string_pretty(value).map_err(to_io_error)?;
    fs::write(path, json)
}

/// File name for a model, safe on every platform (`llama3.2:1b` becomes
/// `llama3.2_1b.json`).
pub fn raw_file_name(model: &str) -> String {
    let safe: String = model
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect();
    format!("{}.json", safe)
}

/// Ensure the output directory and its `raw/` sub-directory exist.
pub fn ensure_output_dirs(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir.join(RAW_DIR))
}

/// Write the entries of each model to `raw/<model>.json`.
pub fn write_raw_results(report: &BenchmarkReport, dir: &Path) -> io::Result<Vec<PathBuf>> {
    ensure_output_dirs(dir)?;
    let mut written = Vec::new();
    for model in report.models() {
        let entries: Vec<&ResultEntry> = report.entries_for(model).collect();
        let path = dir.join(RAW_DIR).join(raw_file_name(model));
        write_json(&entries, &path)?;
        written.push(path);
    }
    Ok(written)
}

/// Write the complete report as JSON.
pub fn write_report_json(report: &BenchmarkReport, path: impl AsRef<Path>) -> io::Result<()> {
    write_json(report, path.as_ref())
}

/// Write the Markdown summary.
pub fn write_summary(report: &BenchmarkReport, dir: &Path) -> io::Result<()> {
    ensure_output_dirs(dir)?;
    fs::write(dir.join(SUMMARY_FILE), markdown::generate_summary(report))
}

/// Write raw per-model files, the combined report and the summary.
pub fn write_all_outputs(report: &BenchmarkReport, dir: impl AsRef<Path>) -> io::Result<()> {
    let dir = dir.as_ref();
    ensure_output_dirs(dir)?;

    write_raw_results(report, dir)?;
    write_report_json(report, dir.join(ALL_RESULTS_FILE))?;
    write_summary(report, dir)?;

    info!(dir = %dir.display(), tests = report.total_tests, "Benchmark outputs written");
    Ok(())
}

/// Read a report previously written by [`write_report_json`].
pub fn read_report_json(path: impl AsRef<Path>) -> io::Result<BenchmarkReport> {
    let content = fs::read_to_string(path)?;
    serde_json::from_str(&content).map_err(to_io_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::tests::record;
    use ollamometer_core::ResultSet;
    use std::collections::BTreeMap;

    fn temp_dir() -> PathBuf {
        std::env::temp_dir().join(format!("ollamometer-io-{}", uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_raw_file_name_sanitizes_tags() {
        assert_eq!(raw_file_name("llama3.2:1b"), "llama3.2_1b.json");
        assert_eq!(raw_file_name("org/model:7b"), "org_model_7b.json");
    }

    #[test]
    fn test_write_all_outputs_layout() {
        let dir = temp_dir();
        let set: ResultSet = vec![
            record("llama3.2:1b", "quick_qa", 1, 30),
            record("mistral:7b", "quick_qa", 1, 12),
            record("llama3.2:1b", "quick_qa", 2, 32),
        ]
        .into_iter()
        .collect();
        let report = BenchmarkReport::new(BTreeMap::new(), &set);

        write_all_outputs(&report, &dir).unwrap();

        assert!(dir.join(RAW_DIR).join("llama3.2_1b.json").exists());
        assert!(dir.join(RAW_DIR).join("mistral_7b.json").exists());
        assert!(dir.join(SUMMARY_FILE).exists());

        let raw: Vec<serde_json::Value> = serde_json::from_str(
            &fs::read_to_string(dir.join(RAW_DIR).join("llama3.2_1b.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(raw.len(), 2);

        let back = read_report_json(dir.join(ALL_RESULTS_FILE)).unwrap();
        assert_eq!(back.total_tests, 3);
        assert_eq!(back.results[1].record.model, "mistral:7b");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_read_missing_report_fails() {
        assert!(read_report_json(temp_dir().join(ALL_RESULTS_FILE)).is_err());
    }
}
