//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use vacal_runner::{DispatchError, StoreError, TailError};

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    StoreError(StoreError),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::StoreError(err) => {
                tracing::error!("Job store error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Validation(e) => ApiError::BadRequest(e.to_string()),
            DispatchError::NotFound(_) => ApiError::NotFound("Task not found".to_string()),
            DispatchError::Store(e) => ApiError::StoreError(e),
            DispatchError::Io(e) => ApiError::InternalError(format!("Failed to start task: {}", e)),
        }
    }
}

impl From<TailError> for ApiError {
    fn from(err: TailError) -> Self {
        match err {
            TailError::NotFound(_) => ApiError::NotFound("Log file not found".to_string()),
            TailError::Io(e) => ApiError::InternalError(format!("Failed to read log file: {}", e)),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
