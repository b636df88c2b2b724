//! Error types for motility-server
//!
//! [`PipelineError`] is what every stage returns. [`ApiError`] is what the
//! HTTP layer renders; validation and not-found problems are client errors,
//! everything else is a server-side failure.

use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure of one pipeline stage
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Bad input shape or type, detected before any work starts
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced session, file or tracking data is absent
    #[error("Not found: {0}")]
    NotFound(String),

    /// External analysis or plotting process failed
    #[error("Worker failed ({command}): {message}")]
    Worker {
        command: String,
        message: String,
        stderr: String,
    },

    /// Fast-start normalization failed
    #[error("Transcode failed: {message}")]
    Transcode { message: String, stderr: String },

    /// Filesystem operation failed
    #[error("Storage error: {0}")]
    Storage(String),
}

impl PipelineError {
    pub fn storage(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        PipelineError::Storage(format!("{}: {}", context, err))
    }
}

impl From<motility_common::Error> for PipelineError {
    fn from(err: motility_common::Error) -> Self {
        match err {
            motility_common::Error::InvalidInput(msg) => PipelineError::Validation(msg),
            err @ motility_common::Error::Config(_) => PipelineError::Storage(err.to_string()),
        }
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Internal server error (500), optionally with worker diagnostics
    #[error("Internal server error: {message}")]
    Internal {
        code: &'static str,
        message: String,
        detail: Option<String>,
    },
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Validation(msg) => ApiError::BadRequest(msg),
            PipelineError::NotFound(msg) => ApiError::NotFound(msg),
            PipelineError::Worker { message, stderr, .. } => ApiError::Internal {
                code: "WORKER_FAILED",
                message,
                detail: Some(stderr),
            },
            PipelineError::Transcode { message, stderr } => ApiError::Internal {
                code: "TRANSCODE_FAILED",
                message,
                detail: Some(stderr),
            },
            PipelineError::Storage(msg) => ApiError::Internal {
                code: "STORAGE_ERROR",
                message: msg,
                detail: None,
            },
        }
    }
}

// Extractor rejections are client errors and use the same envelope
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, detail) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Internal {
                code,
                message,
                detail,
            } => (StatusCode::INTERNAL_SERVER_ERROR, code, message, detail),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(detail) = detail {
            error["detail"] = json!(detail);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
