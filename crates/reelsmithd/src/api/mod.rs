//! HTTP handlers.

pub mod health;
pub mod jobs;
pub mod videos;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reelsmith_core::artifact::ArtifactError;
use reelsmith_core::domain::JobError;
use serde_json::json;

/// JSON error body: `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        match e {
            JobError::NotFound(_) => Self::not_found(e.to_string()),
            JobError::StillRunning(_) => Self::new(StatusCode::CONFLICT, e.to_string()),
        }
    }
}

impl From<ArtifactError> for ApiError {
    fn from(e: ArtifactError) -> Self {
        match e {
            ArtifactError::NotFound(_) => Self::not_found(e.to_string()),
            ArtifactError::InvalidName(_) => Self::bad_request(e.to_string()),
            _ => {
                tracing::error!(error = %e, "artifact store failure");
                Self::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
