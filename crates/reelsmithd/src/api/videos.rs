//! Finished video listing and download.

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use reelsmith_core::artifact::{ArtifactError, ArtifactName, ArtifactStore};
use serde::{Deserialize, Serialize};

use super::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct VideoEntry {
    pub job_id: String,
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

fn is_video(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".mp4")
}

/// Every `.mp4` artifact across job workspaces, newest first.
pub async fn list(State(state): State<AppState>) -> ApiResult<Json<Vec<VideoEntry>>> {
    let mut videos = Vec::new();
    let mut dir = tokio::fs::read_dir(state.workspace.root())
        .await
        .map_err(ArtifactError::Io)?;

    while let Some(item) = dir.next_entry().await.map_err(ArtifactError::Io)? {
        if !item.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
            continue;
        }
        let job_id = item.file_name().to_string_lossy().into_owned();
        // Directories that are not valid job names are skipped.
        let Ok(store) = state.workspace.scoped(&job_id) else {
            continue;
        };
        for entry in store.list().await? {
            if is_video(&entry.name) {
                videos.push(VideoEntry {
                    job_id: job_id.clone(),
                    name: entry.name,
                    size: entry.size,
                    created_at: entry.created_at,
                });
            }
        }
    }

    videos.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.name.cmp(&b.name)));
    Ok(Json(videos))
}

/// Stream one video's bytes.
pub async fn download(
    State(state): State<AppState>,
    Path((job, name)): Path<(String, String)>,
) -> ApiResult<Response> {
    ArtifactName::custom(&job)?;
    let artifact = ArtifactName::custom(&name)?;
    if !is_video(&name) {
        return Err(ApiError::bad_request(format!("not a video: {name}")));
    }

    let job_dir = state.workspace.root().join(&job);
    if !tokio::fs::try_exists(&job_dir).await.unwrap_or(false) {
        return Err(ApiError::not_found(format!("job not found: {job}")));
    }
    let bytes = state.workspace.scoped(&job)?.read(&artifact).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{name}\""),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}
