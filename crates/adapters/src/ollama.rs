// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Ollama adapter for Ollamometer.
//!
//! This module implements [`InferenceBackend`] over the Ollama REST API.
//!
//! # Endpoints
//!
//! - `GET /api/tags` - availability probe and downloaded models
//! - `POST /api/generate` - non-streaming completion; with `keep_alive: 0`
//!   and no prompt it evicts the model instead
//! - `GET /api/ps` - loaded models with memory footprint
//! - `POST /api/pull` - model download, streamed as newline-delimited JSON
//!
//! # Example
//!
//! ```ignore
//! use ollamometer_adapters::ollama::OllamaClient;
//!
//! let client = OllamaClient::new("http://localhost:11434")?;
//! let response = client.generate("llama3.2:1b", "Why is the sky blue?").await?;
//! println!("{} tokens", response.eval_count);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use ollamometer_core::backend::{
    BackendError, BackendResult, GenerateResponse, InferenceBackend, LoadedModel, PullProgress,
};
use reqwest::{Client, Response};
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Longest error body kept in a [`BackendError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// Errors that can occur while building an Ollama client.
#[derive(Debug, Error)]
pub enum OllamaAdapterError {
    /// Base URL is empty or not http(s)
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

/// Result type for adapter construction.
pub type Result<T> = std::result::Result<T, OllamaAdapterError>;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct UnloadRequest<'a> {
    model: &'a str,
    keep_alive: u32,
}

#[derive(Debug, Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

/// `/api/generate` response. A counter that is absent, null, or not a
/// non-negative integer reads as zero.
#[derive(Debug, Default, Deserialize)]
struct GenerateWire {
    #[serde(default, deserialize_with = "lenient_count")]
    total_duration: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    load_duration: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    prompt_eval_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    prompt_eval_duration: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    eval_count: u64,
    #[serde(default, deserialize_with = "lenient_count")]
    eval_duration: u64,
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(value.as_u64().unwrap_or(0))
}

impl From<GenerateWire> for GenerateResponse {
    fn from(wire: GenerateWire) -> Self {
        Self {
            total_duration_ns: wire.total_duration,
            load_duration_ns: wire.load_duration,
            prompt_eval_count: wire.prompt_eval_count,
            prompt_eval_duration_ns: wire.prompt_eval_duration,
            eval_count: wire.eval_count,
            eval_duration_ns: wire.eval_duration,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TagsWire {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct PsWire {
    #[serde(default)]
    models: Vec<PsEntry>,
}

#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    size_vram: u64,
}

impl From<PsEntry> for LoadedModel {
    fn from(entry: PsEntry) -> Self {
        Self {
            name: entry.name,
            size_bytes: entry.size,
            size_vram_bytes: entry.size_vram,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PullLine {
    #[serde(default)]
    status: String,
    #[serde(default)]
    completed: u64,
    #[serde(default)]
    total: u64,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Parse one NDJSON line of a pull stream, forwarding progress.
///
/// Returns `Ok(true)` once the server reports completion.
fn handle_pull_line(
    line: &[u8],
    progress: &mpsc::UnboundedSender<PullProgress>,
) -> BackendResult<bool> {
    let line = match std::str::from_utf8(line) {
        Ok(text) => text.trim(),
        Err(e) => return Err(BackendError::Decode(e.to_string())),
    };
    if line.is_empty() {
        return Ok(false);
    }

    let parsed: PullLine =
        serde_json::from_str(line).map_err(|e| BackendError::Decode(e.to_string()))?;
    if let Some(error) = parsed.error {
        return Err(BackendError::Other(error));
    }

    let done = parsed.done || parsed.status == "success";
    // The receiver may have gone away; the download itself continues.
    let _ = progress.send(PullProgress {
        status: parsed.status,
        completed: parsed.completed,
        total: parsed.total,
    });
    Ok(done)
}

fn transport_error(err: reqwest::Error) -> BackendError {
    if err.is_decode() {
        BackendError::Decode(err.to_string())
    } else {
        BackendError::Unavailable(err.to_string())
    }
}

/// Turn a non-success response into [`BackendError::Status`].
async fn check_status(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let mut body = response.text().await.unwrap_or_default();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

/// HTTP client for an Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: Client,
    base_url: String,
    availability_timeout: Duration,
}

impl OllamaClient {
    /// Create a client for `base_url` with a 2 second availability probe.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_availability_timeout(base_url, Duration::from_secs(2))
    }

    /// Create a client with a custom availability probe timeout.
    ///
    /// Generate and pull calls have no overall timeout: a cold model load
    /// followed by a long completion can legitimately take minutes.
    pub fn with_availability_timeout(
        base_url: impl Into<String>,
        availability_timeout: Duration,
    ) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(OllamaAdapterError::InvalidBaseUrl(base_url));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url,
            availability_timeout,
        })
    }

    /// Base URL without trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl InferenceBackend for OllamaClient {
    async fn is_available(&self) -> bool {
        match self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.availability_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, base_url = %self.base_url, "Ollama availability probe failed");
                false
            }
        }
    }

    async fn list_models(&self) -> BackendResult<Vec<String>> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .send()
            .await
            .map_err(transport_error)?;
        let tags: TagsWire = check_status(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        Ok(tags
            .models
            .into_iter()
            .map(|m| m.name)
            .filter(|name| !name.is_empty())
            .collect())
    }

    async fn generate(&self, model: &str, prompt: &str) -> BackendResult<GenerateResponse> {
        let request = GenerateRequest {
            model,
            prompt,
            stream: false,
        };
        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let wire: GenerateWire = check_status(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        Ok(wire.into())
    }

    async fn unload(&self, model: &str) -> BackendResult<()> {
        let request = UnloadRequest {
            model,
            keep_alive: 0,
        };
        let response = self
            .client
            .post(self.url("/api/generate"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }

    async fn list_loaded_models(&self) -> BackendResult<Vec<LoadedModel>> {
        let response = self
            .client
            .get(self.url("/api/ps"))
            .send()
            .await
            .map_err(transport_error)?;
        let ps: PsWire = check_status(response)
            .await?
            .json()
            .await
            .map_err(transport_error)?;

        Ok(ps.models.into_iter().map(LoadedModel::from).collect())
    }

    async fn pull(
        &self,
        model: &str,
        progress: mpsc::UnboundedSender<PullProgress>,
    ) -> BackendResult<()> {
        let request = PullRequest {
            name: model,
            stream: true,
        };
        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&request)
            .send()
            .await
            .map_err(transport_error)?;
        let mut response = check_status(response).await?;

        let mut buffer: Vec<u8> = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(transport_error)? {
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                if handle_pull_line(&line, &progress)? {
                    return Ok(());
                }
            }
        }

        if !buffer.is_empty() && !handle_pull_line(&buffer, &progress)? {
            warn!(model = %model, "Pull stream ended without a success status");
        }
        Ok(())
    }
}
