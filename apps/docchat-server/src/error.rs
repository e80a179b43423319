//! Error types for the docchat server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use docchat_core::{BlobError, HighlightError};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Server error types
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Document not found: {0}")]
    NotFound(String),

    #[error("Invalid PDF: {0}")]
    InvalidDocument(String),

    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    #[error("Chat backend is not configured")]
    BackendUnavailable,

    #[error("Chat backend error: {0}")]
    Backend(String),

    /// Non-success reply from the chat backend, passed through unchanged
    #[error("Chat backend returned {status}")]
    BackendStatus { status: StatusCode, body: Value },

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    success: bool,
    error: String,
    code: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ServerError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg),
            ServerError::NotFound(name) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Document '{}' not found", name),
            ),
            ServerError::InvalidDocument(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_PDF", msg)
            }
            ServerError::Timeout(ms) => (
                StatusCode::REQUEST_TIMEOUT,
                "TIMEOUT",
                format!("Request timeout after {}ms", ms),
            ),
            ServerError::BackendUnavailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "BACKEND_UNAVAILABLE",
                "Chat backend is not configured".to_string(),
            ),
            ServerError::Backend(msg) => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR", msg),
            ServerError::BackendStatus { status, body } => {
                return (status, Json(body)).into_response();
            }
            ServerError::Internal(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = ErrorResponse {
            success: false,
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<BlobError> for ServerError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(name) => ServerError::NotFound(name),
            BlobError::InvalidName(name) => {
                ServerError::InvalidRequest(format!("invalid document name {:?}", name))
            }
            BlobError::Io(e) => ServerError::Internal(e.to_string()),
        }
    }
}

impl From<HighlightError> for ServerError {
    fn from(err: HighlightError) -> Self {
        match err {
            HighlightError::Blob(e) => e.into(),
            HighlightError::Document(msg) => ServerError::InvalidDocument(msg),
            other => ServerError::Internal(other.to_string()),
        }
    }
}
