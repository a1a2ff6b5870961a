// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Inference backend adapters for Ollamometer.
//!
//! Each adapter implements [`ollamometer_core::InferenceBackend`] for one
//! kind of inference server. Only Ollama is supported today.

#![warn(missing_docs, rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod ollama;

pub use ollama::{OllamaAdapterError, OllamaClient};
