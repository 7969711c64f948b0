//! HTTP surface over the job service and the upload store.

mod handlers;

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::error::{JobError, StorageError};
use crate::jobs::JobService;
use crate::storage::UploadStore;

/// Largest accepted upload body.
const MAX_UPLOAD_SIZE: usize = 64 * 1024 * 1024;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<JobService>,
    pub store: Arc<UploadStore>,
}

/// Build the Axum router with task and upload routes.
pub fn routes(jobs: Arc<JobService>, store: Arc<UploadStore>) -> Router {
    let state = AppState { jobs, store };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/tasks", get(handlers::list_tasks).post(handlers::submit_task))
        .route("/tasks/upload", post(handlers::upload))
        .route("/tasks/{id}", get(handlers::get_task))
        .route("/list_files", get(handlers::list_files))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_SIZE))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Handler error rendered as `{"error": "..."}` with a matching status.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Job(JobError),
    Storage(StorageError),
}

impl From<JobError> for ApiError {
    fn from(e: JobError) -> Self {
        Self::Job(e)
    }
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Job(JobError::InvalidInput { .. }) => StatusCode::BAD_REQUEST,
            Self::Job(JobError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Job(JobError::PoolRejected { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Job(JobError::InvalidTransition { .. }) => StatusCode::CONFLICT,
            Self::Storage(StorageError::InvalidFileName(_)) => StatusCode::BAD_REQUEST,
            Self::Storage(StorageError::Io(_)) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::BadRequest(msg) | Self::NotFound(msg) => msg.clone(),
            Self::Job(e) => e.to_string(),
            Self::Storage(e) => e.to_string(),
        };
        if status.is_server_error() {
            error!(status = %status, error = %message, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
