use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use lumina_model::JobKind;

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub job_type: String,
    #[serde(default = "empty_object")]
    pub parameters: serde_json::Value,
}

fn empty_object() -> serde_json::Value {
    serde_json::json!({})
}

pub async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<CreateJobRequest>,
) -> ApiResult<impl IntoResponse> {
    let kind = JobKind::parse(&request.job_type).ok_or_else(|| {
        ApiError::bad_request(format!("unknown job type {}", request.job_type))
    })?;
    let job = state.orchestrator.enqueue(kind, request.parameters).await?;
    Ok((StatusCode::ACCEPTED, Json(job)))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.get(id).await?))
}

#[derive(Debug, Deserialize)]
pub struct ListJobsParams {
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_limit() -> u64 {
    50
}

pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<ListJobsParams>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.orchestrator.list_recent(params.limit).await?))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.orchestrator.cancel(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
