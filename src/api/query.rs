use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;

use super::ApiError;
use crate::models::QueryRequest;
use crate::state::AppState;

/// POST /query/ - Answer a question from the indexed repositories as plain text
pub async fn query(
    State(state): State<AppState>,
    payload: Result<Json<QueryRequest>, JsonRejection>,
) -> Result<String, ApiError> {
    let Json(req) = payload?;
    let index = state.index.get().map_err(query_error)?;
    let answer = index
        .query(&req.query, &req.mode)
        .await
        .map_err(query_error)?;
    Ok(answer)
}

fn query_error(e: anyhow::Error) -> ApiError {
    tracing::error!("Query failed: {e:#}");
    ApiError::internal(format!("Query error: {e:#}"))
}
