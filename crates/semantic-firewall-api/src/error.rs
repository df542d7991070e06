//! API error type and HTTP mapping
//!
//! A blocked request is not an error; it surfaces as a 200 response with
//! `blocked: true`. Errors map to: validation 400, not found 404, backend
//! failure 502, benchmark subsystem unavailable 503, everything else 500.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use semantic_firewall_core::Error;
use serde::{Deserialize, Serialize};

/// API error taxonomy
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Malformed request or comparison guardrail violation (400)
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown run or dataset (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream LLM failure (502)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Benchmark subsystem not initialized (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal pipeline failure (500)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Backend(_) => StatusCode::BAD_GATEWAY,
            ApiError::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Backend(_) => "BACKEND_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
            ApiError::Internal(_) => "FIREWALL_ERROR",
        }
    }
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(serde_json::json!({
            "success": false,
            "error": ErrorResponse {
                code: self.error_code().to_string(),
                message: self.to_string(),
            },
        }));
        (status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidInput(message) => ApiError::Validation(message),
            Error::NotFound(message) => ApiError::NotFound(message),
            Error::Backend(message) => ApiError::Backend(message),
            Error::Unavailable(message) => ApiError::ServiceUnavailable(message),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
