//! Request handlers for the task and upload routes.

use std::path::PathBuf;

use axum::{
    Json,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use super::{ApiError, AppState};
use crate::storage::StoredFile;

// ── Health ──────────────────────────────────────────────────────────────

pub(super) async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "taskhub"
    }))
}

// ── Uploads ─────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct UploadResponse {
    message: &'static str,
    #[serde(flatten)]
    file: StoredFile,
}

pub(super) async fn upload(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed upload: {e}")))?
    {
        if field.name() != Some("file") {
            debug!(field = ?field.name(), "Ignoring upload field");
            continue;
        }

        let file_name = field
            .file_name()
            .map(str::to_string)
            .ok_or_else(|| ApiError::BadRequest("Upload has no file name".into()))?;
        let bytes = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {e}")))?;

        let file = state.store.save(&file_name, &bytes).await?;
        return Ok((
            StatusCode::ACCEPTED,
            Json(UploadResponse {
                message: "File uploaded successfully",
                file,
            }),
        ));
    }

    Err(ApiError::BadRequest("Missing multipart field \"file\"".into()))
}

pub(super) async fn list_files(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ApiError> {
    let files = state.store.list().await?;
    Ok(Json(serde_json::json!({ "files": files })))
}

// ── Tasks ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub(super) struct SubmitRequest {
    file_path: PathBuf,
    languages: Vec<String>,
    #[serde(default)]
    email: Option<String>,
}

pub(super) async fn submit_task(
    State(state): State<AppState>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(body) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    if !body.file_path.as_os_str().is_empty()
        && !tokio::fs::try_exists(&body.file_path).await.unwrap_or(false)
    {
        return Err(ApiError::BadRequest(format!(
            "File not found: {}",
            body.file_path.display()
        )));
    }

    let job_id = state
        .jobs
        .submit_job(body.file_path, body.languages, body.email)
        .await?;

    info!(job_id = %job_id, "Task accepted");
    Ok((
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "job_id": job_id })),
    ))
}

pub(super) async fn list_tasks(State(state): State<AppState>) -> impl IntoResponse {
    let jobs = state.jobs.list_jobs().await;
    let summary = state.jobs.summary().await;
    Json(serde_json::json!({ "jobs": jobs, "summary": summary }))
}

pub(super) async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    // An id that cannot be ours is reported the same as an unknown one.
    let id = Uuid::parse_str(&id).map_err(|_| ApiError::NotFound(format!("Job {id} not found")))?;
    let job = state.jobs.get_job(id).await?;
    Ok(Json(job))
}
