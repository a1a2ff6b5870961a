// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Markdown output generation for benchmark reports.

use std::fmt::{self, Write};

use crate::result::BenchmarkReport;

/// Generate a Markdown summary of `report`.
pub fn generate_summary(report: &BenchmarkReport) -> String {
    let mut output = String::new();
    // Writing into a String cannot fail.
    let _ = write_summary(report, &mut output);
    output
}

fn write_summary(report: &BenchmarkReport, output: &mut String) -> fmt::Result {
    writeln!(output, "# Benchmark Summary")?;
    writeln!(output)?;
    writeln!(output, "Generated: {}", report.generated_at.to_rfc3339())?;
    writeln!(output)?;

    if !report.system_info.is_empty() {
        writeln!(output, "## System")?;
        writeln!(output)?;
        for (key, value) in &report.system_info {
            match value {
                serde_json::Value::String(s) => writeln!(output, "- **{}:** {}", key, s)?,
                other => writeln!(output, "- **{}:** {}", key, other)?,
            }
        }
        writeln!(output)?;
    }

    writeln!(output, "## Models")?;
    writeln!(output)?;
    writeln!(output, "| Model | Tests | Avg tokens/s | Avg TTFT (s) | Compute mode |")?;
    writeln!(output, "|-------|-------|--------------|--------------|--------------|")?;
    for summary in report.model_summaries() {
        writeln!(
            output,
            "| {} | {} | {:.2} | {:.3} | {} |",
            summary.model,
            summary.tests,
            summary.avg_tokens_per_second,
            summary.avg_time_to_first_token_s,
            summary.compute_mode
        )?;
    }
    writeln!(output)?;

    writeln!(output, "## Results")?;
    writeln!(output)?;
    writeln!(output, "| Model | Prompt | Run | Tokens | Tokens/s | TTFT (s) | Total (s) | VRAM (MB) |")?;
    writeln!(output, "|-------|--------|-----|--------|----------|----------|-----------|-----------|")?;
    for entry in &report.results {
        writeln!(
            output,
            "| {} | {} | {} | {} | {:.2} | {:.3} | {:.2} | {:.1} |",
            entry.record.model,
            entry.record.prompt_id,
            entry.record.run_number,
            entry.record.eval_count,
            entry.derived.tokens_per_second,
            entry.derived.time_to_first_token_s,
            entry.derived.total_duration_s,
            entry.derived.model_size_vram_mb
        )?;
    }

    writeln!(output)?;
    writeln!(output, "---")?;
    writeln!(output, "Total tests: {}", report.total_tests)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result::tests::record;
    use ollamometer_core::ResultSet;
    use std::collections::BTreeMap;

    #[test]
    fn test_summary_contains_models_and_rows() {
        let set: ResultSet = vec![record("m1", "quick_qa", 1, 40), record("m1", "quick_qa", 2, 60)]
            .into_iter()
            .collect();
        let mut info = BTreeMap::new();
        info.insert("name".to_string(), serde_json::json!("bench-box"));
        let report = BenchmarkReport::new(info, &set);

        let summary = generate_summary(&report);
        assert!(summary.starts_with("# Benchmark Summary"));
        assert!(summary.contains("- **name:** bench-box"));
        assert!(summary.contains("| m1 | 2 | 50.00 | 1.000 | Full-accelerator |"));
        assert!(summary.contains("| m1 | quick_qa | 2 | 60 | 60.00 |"));
        assert!(summary.contains("Total tests: 2"));
    }

    #[test]
    fn test_summary_of_empty_report() {
        let report = BenchmarkReport::new(BTreeMap::new(), &ResultSet::new());
        let summary = generate_summary(&report);
        assert!(summary.contains("Total tests: 0"));
        assert!(!summary.contains("## System"));
    }
}
