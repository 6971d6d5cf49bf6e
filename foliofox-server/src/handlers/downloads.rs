//! `/downloads` routes: submit, list, cancel, pause, resume.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use foliofox_model::download::{DownloadJob, DownloadStatus};
use foliofox_model::ids::{IndexerId, JobId, UserId};

use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubmitDownloadBody {
    pub user_id: Uuid,
    pub indexer_id: Uuid,
    pub download_url: String,
    pub title: String,
    pub format: String,
    pub file_size_bytes: Option<u64>,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct SubmitDownloadResponse {
    pub job_id: Uuid,
}

pub async fn submit_download_handler(
    State(state): State<AppState>,
    Json(body): Json<SubmitDownloadBody>,
) -> AppResult<Json<SubmitDownloadResponse>> {
    let job = state
        .scheduler
        .submit(
            UserId::from_uuid(body.user_id),
            IndexerId::from_uuid(body.indexer_id),
            body.download_url,
            body.title,
            body.format,
            body.file_size_bytes,
            body.priority,
        )
        .await?;
    Ok(Json(SubmitDownloadResponse {
        job_id: job.id.as_uuid(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListDownloadsQuery {
    pub user_id: Uuid,
    pub status: Option<String>,
}

pub async fn list_downloads_handler(
    State(state): State<AppState>,
    Query(query): Query<ListDownloadsQuery>,
) -> AppResult<Json<Vec<DownloadJob>>> {
    let status = query
        .status
        .map(|s| s.parse::<DownloadStatus>())
        .transpose()
        .map_err(crate::error::AppError::bad_request)?;
    let jobs = state
        .scheduler
        .list_for_user(UserId::from_uuid(query.user_id), status)
        .await?;
    Ok(Json(jobs))
}

pub async fn cancel_download_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.scheduler.cancel(JobId::from_uuid(id)).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn pause_download_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.scheduler.pause(JobId::from_uuid(id)).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn resume_download_handler(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AppResult<Json<serde_json::Value>> {
    state.scheduler.resume(JobId::from_uuid(id)).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}
