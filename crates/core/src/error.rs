// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error types shared across the Ollamometer core.

use thiserror::Error;

/// Errors raised by the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Another operation already holds the single operation slot.
    #[error("Another operation is already running: {0}")]
    OperationInProgress(String),

    /// Input failed validation before any work started.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration could not be loaded or deserialized.
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Logging could not be initialized.
    #[error("Telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl CoreError {
    /// Shorthand for [`CoreError::InvalidInput`].
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// Result type for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
