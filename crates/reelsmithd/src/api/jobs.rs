//! Job submission, status and cancellation endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use reelsmith_core::domain::{JobError, JobId, JobRequest, JobStatus, Topic, MAX_DURATION_MINUTES};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiError, ApiResult};
use crate::state::AppState;

const DEFAULT_TOPIC: &str = "Basic Derivatives";

/// Body of `POST /api/generate`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub topic: Option<String>,
    pub language: Option<String>,
    pub duration: Option<u32>,
}

impl GenerateRequest {
    fn into_job_request(self) -> ApiResult<JobRequest> {
        let topic = Topic::new(self.topic.as_deref().unwrap_or(DEFAULT_TOPIC))
            .map_err(|e| ApiError::bad_request(e.to_string()))?;
        let duration = self.duration.unwrap_or(1);
        if !(1..=MAX_DURATION_MINUTES).contains(&duration) {
            return Err(ApiError::bad_request(format!(
                "duration must be between 1 and {MAX_DURATION_MINUTES} minutes"
            )));
        }
        Ok(JobRequest::new(topic)
            .with_language(self.language.unwrap_or_else(|| "en".to_string()))
            .with_duration(duration))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub job_id: String,
    pub message: String,
}

/// Start a job and return its id immediately.
pub async fn generate(
    State(state): State<AppState>,
    body: Option<Json<GenerateRequest>>,
) -> ApiResult<Json<GenerateResponse>> {
    let request = body.map(|Json(b)| b).unwrap_or_default().into_job_request()?;
    let topic = request.topic.to_string();
    let handle = state.registry.submit(request).await;
    info!(job_id = %handle.id, topic = %topic, "job submitted");

    Ok(Json(GenerateResponse {
        job_id: handle.id.to_string(),
        message: format!("Video generation started for '{topic}'"),
    }))
}

pub async fn status(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<JobStatus>> {
    Ok(Json(state.registry.status(&JobId::from(id.as_str())).await?))
}

pub async fn list(State(state): State<AppState>) -> Json<Vec<JobStatus>> {
    Json(state.registry.list().await)
}

/// Cancel a running job, or forget a finished one.
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<JobStatus>)> {
    let id = JobId::from(id.as_str());
    match state.registry.remove(&id).await {
        Ok(status) => Ok((StatusCode::OK, Json(status))),
        Err(JobError::StillRunning(_)) => {
            state.registry.cancel(&id).await?;
            info!(job_id = %id, "job cancellation requested");
            Ok((StatusCode::ACCEPTED, Json(state.registry.status(&id).await?)))
        }
        Err(e) => Err(e.into()),
    }
}
