// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Inference backend contract.
//!
//! The orchestration layer never talks HTTP directly. It drives an
//! [`InferenceBackend`], which a concrete adapter (see the
//! `ollamometer-adapters` crate) implements for a real server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors reported by an inference backend.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend could not be reached.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// The backend answered with a non-success status.
    #[error("Backend returned HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// The backend response could not be decoded.
    #[error("Malformed backend response: {0}")]
    Decode(String),

    /// Any other backend failure.
    #[error("Backend error: {0}")]
    Other(String),
}

/// Result type for backend calls.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Raw timing and token counters returned by one generate call.
///
/// Durations are nanoseconds. Adapters default missing fields to zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Wall time spent on the whole request
    pub total_duration_ns: u64,
    /// Time spent loading the model
    pub load_duration_ns: u64,
    /// Number of prompt tokens evaluated
    pub prompt_eval_count: u64,
    /// Time spent evaluating the prompt
    pub prompt_eval_duration_ns: u64,
    /// Number of tokens generated
    pub eval_count: u64,
    /// Time spent generating tokens
    pub eval_duration_ns: u64,
}

/// A model currently resident in backend memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedModel {
    /// Model name as reported by the backend, usually `name:tag`
    pub name: String,
    /// Total resident size in bytes
    pub size_bytes: u64,
    /// Accelerator (VRAM) resident size in bytes
    pub size_vram_bytes: u64,
}

impl LoadedModel {
    /// Whether this entry refers to `model`.
    ///
    /// Backends may report a model with an implicit default tag, so
    /// `llama3` matches both `llama3` and `llama3:latest`.
    pub fn matches(&self, model: &str) -> bool {
        self.name == model
            || self
                .name
                .strip_prefix(model)
                .is_some_and(|rest| rest.starts_with(':'))
    }
}

/// One progress notification from a model pull.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    /// Backend status line, e.g. `pulling manifest`
    pub status: String,
    /// Bytes completed for the current layer
    pub completed: u64,
    /// Total bytes for the current layer
    pub total: u64,
}

/// Synchronous request/response contract of an inference server.
///
/// "Synchronous" refers to the protocol: each call resolves once the server
/// has answered. A generate call may take from sub-second to many minutes.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Check whether the server is reachable.
    async fn is_available(&self) -> bool;

    /// List models already downloaded on the server.
    async fn list_models(&self) -> BackendResult<Vec<String>>;

    /// Run one non-streaming completion.
    async fn generate(&self, model: &str, prompt: &str) -> BackendResult<GenerateResponse>;

    /// Evict a model from memory.
    async fn unload(&self, model: &str) -> BackendResult<()>;

    /// List models currently loaded with their memory footprint.
    async fn list_loaded_models(&self) -> BackendResult<Vec<LoadedModel>>;

    /// Download a model, reporting progress on `progress` until done.
    async fn pull(
        &self,
        model: &str,
        progress: mpsc::UnboundedSender<PullProgress>,
    ) -> BackendResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(name: &str) -> LoadedModel {
        LoadedModel {
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_loaded_model_matches_exact_name() {
        assert!(loaded("llama3.2:1b").matches("llama3.2:1b"));
    }

    #[test]
    fn test_loaded_model_matches_implicit_tag() {
        assert!(loaded("mistral:latest").matches("mistral"));
    }

    #[test]
    fn test_loaded_model_rejects_prefix_without_separator() {
        assert!(!loaded("llama3.2:1b").matches("llama3"));
        assert!(!loaded("qwen2.5:3b").matches("qwen2"));
    }
}
