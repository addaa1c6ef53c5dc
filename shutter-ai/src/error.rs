//! Error types for shutter-ai
//!
//! `AnalysisError` is the pipeline taxonomy. Every stage converts these into
//! its own fallback value; only `Unexpected` ever reaches a caller.
//! `ApiError` maps failures onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// User-facing message for the catastrophic path
pub const USER_FACING_FAILURE: &str = "AI分析中にエラーが発生しました";

/// Pipeline error taxonomy
///
/// Variants carry rendered messages rather than source errors so a failure
/// can be shared between the stages of one analysis (`Clone`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisError {
    /// Image could not be fetched or decoded
    #[error("Image fetch failed: {0}")]
    FetchFailed(String),

    /// Decoded image exceeds the size ceiling
    #[error("Image too large: {actual} bytes (limit {limit})")]
    ImageTooLarge { actual: usize, limit: usize },

    /// Model request failed (transport, HTTP status, empty reply)
    #[error("Model call failed: {0}")]
    ModelCallFailed(String),

    /// Model reply did not contain a usable JSON object
    #[error("Response parse failed: {0}")]
    ResponseParseFailed(String),

    /// Catalog lookup failed
    #[error("Catalog search failed: {0}")]
    CatalogSearchFailed(String),

    /// Model reported unavailable by the one-time availability check
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Stage exceeded its time budget
    #[error("Stage '{stage}' timed out after {seconds}s")]
    StageTimedOut { stage: String, seconds: u64 },

    /// Failure outside any stage's own fallback (e.g. a panic)
    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl AnalysisError {
    /// Message suitable for end users
    pub fn user_message(&self) -> &'static str {
        USER_FACING_FAILURE
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, AnalysisError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Pipeline failure that escaped every fallback
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Analysis(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "ANALYSIS_FAILED",
                err.user_message().to_string(),
            ),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
