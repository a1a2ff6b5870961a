// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! CLI for Ollamometer.
//!
//! Subcommands:
//!
//! - `serve` - run the HTTP API
//! - `run` - run a benchmark sweep headless and write reports
//! - `pull` - download a model
//! - `status` - show backend status and configuration

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use ollamometer_adapters::OllamaClient;
use ollamometer_benchmarks::{
    io, BenchmarkReport, BenchmarkRunner, PullTask, RunnerSettings, SweepPlan,
};
use ollamometer_core::config::AppConfig;
use ollamometer_core::telemetry::{init_tracing, LogFormat};
use ollamometer_core::{
    InferenceBackend, OperationStatus, ProgressEvent, ProgressStream, ProgressTracker,
    StreamSettings,
};
use tokio::task::JoinHandle;
use tracing::debug;

/// Ollamometer CLI.
#[derive(Parser, Debug)]
#[command(name = "ollamometer")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./ollamometer.toml when present).
    #[arg(short, long, global = true, env = "OLLAMOMETER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format: pretty or json.
    #[arg(long, global = true, default_value = "pretty")]
    pub log_format: String,

    /// Subcommand to run.
    #[command(subcommand)]
    pub command: Commands,
}

/// Report formats written by `run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Raw per-model files and the combined JSON report
    Json,
    /// Markdown summary only
    Markdown,
    /// Everything
    Both,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the HTTP API and progress feed.
    Serve {
        /// Bind address override.
        #[arg(long)]
        host: Option<String>,

        /// Bind port override.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Run a benchmark sweep and write reports.
    ///
    /// Results are written to:
    /// - <output>/raw/<model>.json - entries per model
    /// - <output>/all_results.json - combined report
    /// - <output>/summary.md - Markdown summary
    Run {
        /// Models to test, comma separated (default: all configured).
        #[arg(short, long, value_delimiter = ',')]
        models: Vec<String>,

        /// Prompt ids, comma separated (default: all configured).
        #[arg(short = 'P', long, value_delimiter = ',')]
        prompts: Vec<String>,

        /// Runs per model/prompt pair.
        #[arg(short, long)]
        runs: Option<u32>,

        /// Output directory.
        #[arg(short, long, default_value = io::OUTPUT_DIR)]
        output: PathBuf,

        /// Output format.
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Both)]
        format: OutputFormat,

        /// Verbose output.
        #[arg(short, long)]
        verbose: bool,
    },

    /// Download a model.
    Pull {
        /// Model name, e.g. llama3.2:1b.
        model: String,
    },

    /// Show backend status and configuration.
    Status {
        /// Show detailed status information.
        #[arg(short, long)]
        detailed: bool,
    },
}

/// Parse arguments and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_format: LogFormat = cli.log_format.parse()?;
    let default_filter = match &cli.command {
        Commands::Serve { .. } => "info",
        Commands::Run { verbose: true, .. } => "info",
        _ => "warn",
    };
    init_tracing(log_format, default_filter)?;

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    debug!(file = ?cli.config, backend = %config.backend.base_url, "Configuration loaded");

    match cli.command {
        Commands::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            ollamometer_api::serve(config).await
        }
        Commands::Run {
            models,
            prompts,
            runs,
            output,
            format,
            verbose,
        } => run_benchmark(config, models, prompts, runs, output, format, verbose).await,
        Commands::Pull { model } => pull_model(config, model).await,
        Commands::Status { detailed } => show_status(&config, detailed).await,
    }
}

fn backend(config: &AppConfig) -> anyhow::Result<OllamaClient> {
    Ok(OllamaClient::with_availability_timeout(
        config.backend.base_url.as_str(),
        Duration::from_secs(config.backend.availability_timeout_secs),
    )?)
}

async fn require_backend(config: &AppConfig) -> anyhow::Result<Arc<OllamaClient>> {
    let client = backend(config)?;
    if !client.is_available().await {
        bail!(
            "Ollama is not available at {}. Please start Ollama first.",
            config.backend.base_url
        );
    }
    Ok(Arc::new(client))
}

fn progress_bar(length: u64) -> ProgressBar {
    let bar = ProgressBar::new(length);
    bar.set_style(
        ProgressStyle::with_template("[{elapsed_precise}] {bar:30.cyan/dim} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("━╸─"),
    );
    bar
}

/// Mirror tracker progress onto `bar` until the operation ends.
fn render_progress(
    tracker: &ProgressTracker,
    settings: StreamSettings,
    bar: ProgressBar,
) -> JoinHandle<()> {
    let mut events = Box::pin(ProgressStream::new(tracker.clone(), settings).into_stream());
    tokio::spawn(async move {
        while let Some(event) = events.next().await {
            if let ProgressEvent::State(state) = event {
                if state.total > 0 {
                    bar.set_length(state.total);
                    bar.set_position(state.completed);
                }
                bar.set_message(state.message);
            }
        }
    })
}

/// Await `task`, cancelling the tracked operation on Ctrl-C.
async fn supervise<T>(
    tracker: &ProgressTracker,
    bar: &ProgressBar,
    mut task: JoinHandle<T>,
) -> anyhow::Result<T> {
    loop {
        tokio::select! {
            joined = &mut task => return joined.context("background task aborted"),
            _ = tokio::signal::ctrl_c() => {
                if tracker.cancel() {
                    bar.println(format!("{}", "Cancelling after the current test...".yellow()));
                } else {
                    // Second Ctrl-C: stop waiting for the in-flight request.
                    task.abort();
                }
            }
        }
    }
}

async fn run_benchmark(
    config: AppConfig,
    models: Vec<String>,
    prompts: Vec<String>,
    runs: Option<u32>,
    output: PathBuf,
    format: OutputFormat,
    verbose: bool,
) -> anyhow::Result<()> {
    let client = require_backend(&config).await?;

    let models = if models.is_empty() {
        config.benchmark.available_models.clone()
    } else {
        models
    };
    let prompt_ids: Vec<String> = if prompts.is_empty() {
        config.benchmark.prompts.iter().map(|p| p.id.clone()).collect()
    } else {
        prompts
    };
    let plan = SweepPlan::from_ids(&config.benchmark, models, &prompt_ids, runs)?;

    if verbose {
        println!(
            "Running {} tests ({} models x {} prompts x {} runs)",
            plan.total_units(),
            plan.models().len(),
            plan.prompts().len(),
            plan.runs_per_test()
        );
    }

    let tracker = ProgressTracker::new();
    let runner = Arc::new(BenchmarkRunner::new(
        client,
        tracker.clone(),
        RunnerSettings::from(&config.benchmark),
    ));

    let bar = progress_bar(plan.total_units());
    let handle = runner.spawn(plan)?;
    let renderer = render_progress(&tracker, config.stream.settings(), bar.clone());
    let outcome = supervise(&tracker, &bar, handle).await;
    renderer.abort();
    bar.finish_and_clear();
    let results = outcome??;

    if tracker
        .read()
        .is_some_and(|s| s.status == OperationStatus::Cancelled)
    {
        println!("{}", "Benchmark cancelled, results discarded".yellow());
        return Ok(());
    }
    if results.is_empty() {
        bail!("No results available: every benchmark unit failed");
    }

    let report = BenchmarkReport::new(config.system_info.clone(), &results);
    match format {
        OutputFormat::Json => {
            io::write_raw_results(&report, &output)?;
            io::write_report_json(&report, output.join(io::ALL_RESULTS_FILE))?;
        }
        OutputFormat::Markdown => io::write_summary(&report, &output)?,
        OutputFormat::Both => io::write_all_outputs(&report, &output)?,
    }

    println!(
        "{} Completed {} tests",
        "✓".green().bold(),
        report.total_tests
    );
    println!("Results written to {}", output.display());

    if verbose {
        for summary in report.model_summaries() {
            println!(
                "  - {}: {:.2} tokens/s, TTFT {:.3}s, {}",
                summary.model.bold(),
                summary.avg_tokens_per_second,
                summary.avg_time_to_first_token_s,
                summary.compute_mode
            );
        }
    }

    Ok(())
}

async fn pull_model(config: AppConfig, model: String) -> anyhow::Result<()> {
    let client = require_backend(&config).await?;
    let tracker = ProgressTracker::new();
    let task = PullTask::new(client, tracker.clone());

    let bar = progress_bar(0);
    let handle = task.spawn(model.as_str())?;
    let renderer = render_progress(&tracker, config.stream.settings(), bar.clone());
    let outcome = supervise(&tracker, &bar, handle).await;
    renderer.abort();
    bar.finish_and_clear();

    if outcome? {
        println!("{} Pulled {}", "✓".green().bold(), model);
        return Ok(());
    }
    match tracker.read() {
        Some(state) if state.status == OperationStatus::Cancelled => {
            println!("{}", state.message.yellow());
            Ok(())
        }
        Some(state) => bail!(state.error.unwrap_or(state.message)),
        None => bail!("Failed to pull {}", model),
    }
}

async fn show_status(config: &AppConfig, detailed: bool) -> anyhow::Result<()> {
    println!("{}", "Ollamometer".bold());
    println!("Version: {}", env!("CARGO_PKG_VERSION"));

    let client = backend(config)?;
    let available = client.is_available().await;
    let marker = if available {
        "running".green()
    } else {
        "not available".red()
    };
    println!("Ollama ({}): {}", config.backend.base_url, marker);

    if available {
        let downloaded = client.list_models().await.unwrap_or_default();
        println!("\nModels:");
        for model in &config.benchmark.available_models {
            let mark = if downloaded.contains(model) {
                "✓".green()
            } else {
                "✗".red()
            };
            println!("  {} {}", mark, model);
        }
    }

    if detailed {
        println!("\nPrompts:");
        for prompt in &config.benchmark.prompts {
            println!("  - {} ({}): {}", prompt.id, prompt.category, prompt.description);
        }
        println!("\nDefault runs: {}", config.benchmark.default_runs);
        println!("API address: {}", config.bind_address());
        println!("\nOutput files:");
        println!("  - {}/{}/", io::OUTPUT_DIR, io::RAW_DIR);
        println!("  - {}/{}", io::OUTPUT_DIR, io::ALL_RESULTS_FILE);
        println!("  - {}/{}", io::OUTPUT_DIR, io::SUMMARY_FILE);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_lists() {
        let cli = Cli::try_parse_from([
            "ollamometer",
            "run",
            "--models",
            "llama3.2:1b,mistral:7b",
            "-P",
            "quick_qa",
            "--runs",
            "2",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Run {
                models,
                prompts,
                runs,
                output,
                format,
                verbose,
            } => {
                assert_eq!(models, vec!["llama3.2:1b", "mistral:7b"]);
                assert_eq!(prompts, vec!["quick_qa"]);
                assert_eq!(runs, Some(2));
                assert_eq!(output, PathBuf::from(io::OUTPUT_DIR));
                assert_eq!(format, OutputFormat::Json);
                assert!(!verbose);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_serve_overrides() {
        let cli = Cli::try_parse_from(["ollamometer", "serve", "--port", "8080"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Serve {
                host: None,
                port: Some(8080)
            }
        ));
        assert_eq!(cli.log_format, "pretty");
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
