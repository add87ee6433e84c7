use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use uuid::Uuid;

use super::ApiError;
use crate::models::{ProcessRepoRequest, ProcessRepoResponse, TaskStatusResponse};
use crate::state::AppState;

/// POST /process-repo/ - Fetch a repository now, index it in the background
pub async fn process_repo(
    State(state): State<AppState>,
    payload: Result<Json<ProcessRepoRequest>, JsonRejection>,
) -> Result<Json<ProcessRepoResponse>, ApiError> {
    let Json(req) = payload?;
    let submission = state.ingestor.process(&req.repo_url).await.map_err(|e| {
        tracing::error!("Failed to process {}: {e:#}", req.repo_url);
        ApiError::internal(format!("{e:#}"))
    })?;

    // The completion handle is dropped; the task keeps running detached
    Ok(Json(ProcessRepoResponse {
        message: "Repository is being processed. You can check the task status.".to_string(),
        task_id: submission.task_id,
    }))
}

/// GET /status/{task_id} - Current status of an ingestion task
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let task_id = Uuid::parse_str(&task_id).map_err(|_| ApiError::not_found("Task not found"))?;
    let status = state
        .tasks
        .get(&task_id)
        .ok_or_else(|| ApiError::not_found("Task not found"))?;

    Ok(Json(TaskStatusResponse { task_id, status }))
}
