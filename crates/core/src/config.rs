// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Application configuration.
//!
//! Sources are layered, later ones overriding earlier ones:
//!
//! 1. compiled defaults ([`AppConfig::default`]);
//! 2. an optional TOML file (`ollamometer.toml` unless a path is given);
//! 3. environment variables prefixed `OLLAMOMETER__`, with `__` separating
//!    nested keys, e.g. `OLLAMOMETER__SERVER__PORT=8080`.
//!
//! A `.env` file in the working directory is loaded first, if present.
//!
//! # Example
//!
//! ```ignore
//! use ollamometer_core::config::AppConfig;
//!
//! let config = AppConfig::load(None)?;
//! println!("backend: {}", config.backend.base_url);
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::stream::StreamSettings;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "ollamometer.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "OLLAMOMETER";

/// HTTP listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address
    pub host: String,
    /// Bind port
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5555,
        }
    }
}

/// Inference backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the Ollama server
    pub base_url: String,
    /// Timeout for the availability probe, in seconds
    pub availability_timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            availability_timeout_secs: 2,
        }
    }
}

/// A benchmark prompt with its workload description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptSpec {
    /// Stable identifier
    pub id: String,
    /// Display name
    pub name: String,
    /// Prompt text sent to the model
    #[serde(rename = "prompt")]
    pub text: String,
    /// Workload category
    #[serde(default)]
    pub category: String,
    /// What the prompt stresses
    #[serde(default)]
    pub description: String,
}

impl PromptSpec {
    /// Create a prompt without category or description.
    pub fn new(id: impl Into<String>, name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            text: text.into(),
            category: String::new(),
            description: String::new(),
        }
    }

    fn described(mut self, category: &str, description: &str) -> Self {
        self.category = category.to_string();
        self.description = description.to_string();
        self
    }
}

/// The built-in prompt catalogue.
pub fn default_prompts() -> Vec<PromptSpec> {
    vec![
        PromptSpec::new(
            "quick_qa",
            "Quick Q&A",
            "What is recursion in programming? Give a brief explanation.",
        )
        .described("Factual", "Tests TTFT and cold start performance"),
        PromptSpec::new(
            "code_generation",
            "Code Generation",
            "Write a Python function that finds the longest palindrome substring in a given \
             string. Include detailed comments explaining the algorithm and handle edge cases.",
        )
        .described("Coding", "Tests sustained generation performance"),
        PromptSpec::new(
            "creative_writing",
            "Creative Writing",
            "Write a short story (approximately 300 words) about a time traveler who \
             accidentally changes a small detail in history and must deal with the unexpected \
             consequences.",
        )
        .described("Creative", "Tests long output generation"),
        PromptSpec::new(
            "reasoning",
            "Multi-Step Reasoning",
            "A train leaves Chicago at 3:00 PM traveling east at 60 mph. Another train leaves \
             New York at 4:00 PM traveling west at 80 mph. The cities are 800 miles apart. When \
             and where will the trains meet? Show your work step by step.",
        )
        .described("Analytical", "Tests computational reasoning"),
        PromptSpec::new(
            "analysis",
            "Detailed Analysis",
            "Compare and contrast the bubble sort and merge sort algorithms. Discuss their time \
             complexity (best, average, worst case), space complexity, stability, and practical \
             use cases. When would you choose one over the other?",
        )
        .described("Analytical", "Tests analytical processing"),
    ]
}

/// Benchmark sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BenchmarkConfig {
    /// Models offered for testing
    pub available_models: Vec<String>,
    /// Prompt catalogue
    pub prompts: Vec<PromptSpec>,
    /// Runs per model/prompt pair when the caller does not say
    pub default_runs: u32,
    /// Run counts offered to users
    pub runs_options: Vec<u32>,
    /// Pause after unloading a model, in milliseconds
    pub unload_settle_ms: u64,
    /// Abandon an in-flight generate call as soon as the sweep is cancelled
    pub abort_in_flight: bool,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            available_models: vec![
                "llama3.2:1b".to_string(),
                "llama3.2:3b".to_string(),
                "qwen2.5:3b".to_string(),
                "mistral:7b".to_string(),
            ],
            prompts: default_prompts(),
            default_runs: 3,
            runs_options: vec![1, 2, 3, 5, 10],
            unload_settle_ms: 1000,
            abort_in_flight: false,
        }
    }
}

impl BenchmarkConfig {
    /// Look up a prompt by id.
    pub fn prompt(&self, id: &str) -> Option<&PromptSpec> {
        self.prompts.iter().find(|p| p.id == id)
    }

    /// Pause after unloading a model.
    pub fn unload_settle(&self) -> Duration {
        Duration::from_millis(self.unload_settle_ms)
    }
}

/// Floor for the stream poll interval so an idle observer never spins.
pub const MIN_POLL_INTERVAL_MS: u64 = 10;

/// Progress stream settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Upper bound between two state reads, in milliseconds
    pub poll_interval_ms: u64,
    /// Delay before closing after a terminal event, in milliseconds
    pub terminal_grace_ms: u64,
    /// Close the stream after reporting idle
    pub idle_terminates: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            terminal_grace_ms: 2000,
            idle_terminates: true,
        }
    }
}

impl StreamConfig {
    /// Runtime settings for a progress stream.
    pub fn settings(&self) -> StreamSettings {
        StreamSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS)),
            terminal_grace: Duration::from_millis(self.terminal_grace_ms),
            idle_terminates: self.idle_terminates,
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP listener
    pub server: ServerConfig,
    /// Inference backend
    pub backend: BackendConfig,
    /// Benchmark sweep
    pub benchmark: BenchmarkConfig,
    /// Progress stream
    pub stream: StreamConfig,
    /// Free-form description of the machine under test, copied into reports
    pub system_info: BTreeMap<String, serde_json::Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let system_info = [
            ("name", serde_json::json!("my-pc")),
            ("cpu_model", serde_json::json!("unknown")),
            ("cpu_cores", serde_json::json!(0)),
            ("cpu_arch", serde_json::json!(std::env::consts::ARCH)),
            ("ram_gb", serde_json::json!(0.0)),
            ("gpu_model", serde_json::json!("CPU-only")),
            ("gpu_vram_gb", serde_json::json!(0.0)),
            ("os_name", serde_json::json!(std::env::consts::OS)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();

        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            benchmark: BenchmarkConfig::default(),
            stream: StreamConfig::default(),
            system_info,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, file and environment.
    ///
    /// A missing default file is ignored; an explicitly given path must
    /// exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // A missing .env file is the normal case.
        let _ = dotenvy::dotenv();

        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let config = Config::builder()
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(file)
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("benchmark.available_models")
                    .with_list_parse_key("benchmark.runs_options")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Socket address string for the HTTP listener.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5555);
        assert_eq!(config.backend.base_url, "http://localhost:11434");
        assert_eq!(config.benchmark.default_runs, 3);
        assert_eq!(config.benchmark.prompts.len(), 5);
        assert_eq!(config.bind_address(), "0.0.0.0:5555");
    }

    #[test]
    fn test_prompt_lookup() {
        let config = BenchmarkConfig::default();
        assert_eq!(config.prompt("reasoning").unwrap().name, "Multi-Step Reasoning");
        assert!(config.prompt("missing").is_none());
    }

    #[test]
    fn test_stream_settings_conversion() {
        let settings = StreamConfig::default().settings();
        assert_eq!(settings, StreamSettings::default());
    }

    #[test]
    fn test_zero_poll_interval_is_clamped() {
        let config = StreamConfig {
            poll_interval_ms: 0,
            ..StreamConfig::default()
        };
        assert_eq!(
            config.settings().poll_interval,
            Duration::from_millis(MIN_POLL_INTERVAL_MS)
        );
    }

    #[test]
    fn test_load_reads_explicit_file() {
        let dir = std::env::temp_dir().join(format!("ollamometer-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("custom.toml");
        std::fs::write(
            &path,
            "[server]\nport = 8088\n\n[benchmark]\nunload_settle_ms = 0\n",
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 8088);
        assert_eq!(config.benchmark.unload_settle_ms, 0);
        assert_eq!(config.benchmark.prompts.len(), 5);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let path = std::env::temp_dir().join("ollamometer-does-not-exist.toml");
        assert!(AppConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn test_prompt_spec_wire_name() {
        let json = serde_json::to_value(PromptSpec::new("a", "A", "text")).unwrap();
        assert_eq!(json["prompt"], "text");
    }
}
