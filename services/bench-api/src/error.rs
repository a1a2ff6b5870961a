// Copyright 2025 Ollamometer Contributors
// SPDX-License-Identifier: Apache-2.0

//! API error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use ollamometer_benchmarks::RunnerError;
use ollamometer_core::CoreError;
use serde_json::json;

/// Error rendered as `{"error": {"code", "message"}, "meta": {"timestamp"}}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            code: "OPERATION_IN_PROGRESS",
            message: message.into(),
        }
    }

    pub fn not_found(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            code,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR",
            message: message.into(),
        }
    }
}

impl From<RunnerError> for ApiError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Core(CoreError::OperationInProgress(_)) => {
                ApiError::conflict("Another operation is already running")
            }
            RunnerError::InvalidPlan(reason) => ApiError::bad_request("INVALID_REQUEST", reason),
            other => ApiError::internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "code": self.code,
                "message": self.message,
            },
            "meta": {
                "timestamp": Utc::now().to_rfc3339(),
            }
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runner_errors_map_to_status_codes() {
        let busy = ApiError::from(RunnerError::Core(CoreError::OperationInProgress("x".into())));
        assert_eq!(busy.status, StatusCode::CONFLICT);

        let invalid = ApiError::from(RunnerError::InvalidPlan("no models selected".into()));
        assert_eq!(invalid.status, StatusCode::BAD_REQUEST);
        assert_eq!(invalid.message, "no models selected");

        let failed = ApiError::from(RunnerError::Failed("boom".into()));
        assert_eq!(failed.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
