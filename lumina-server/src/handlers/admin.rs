use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use lumina_core::index::{RebuildMode, RebuildOptions, VerifyReport};
use lumina_model::CollectionId;

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildRequest {
    #[serde(default = "default_mode")]
    pub mode: String,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub skip_thumbnail_caching: bool,
}

fn default_mode() -> String {
    "changedOnly".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RebuildResponse {
    pub total: u64,
    pub rebuilt: u64,
    pub skipped: u64,
    pub duration_ms: u64,
    pub peak_memory_bytes: u64,
}

fn parse_mode(raw: &str) -> ApiResult<RebuildMode> {
    match raw {
        "full" => Ok(RebuildMode::Full),
        "changedOnly" => Ok(RebuildMode::ChangedOnly),
        "forceRebuildAll" => Ok(RebuildMode::ForceRebuildAll),
        "verify" => Ok(RebuildMode::Verify),
        other => Err(ApiError::bad_request(format!(
            "unknown rebuild mode {other}"
        ))),
    }
}

pub async fn rebuild_index(
    State(state): State<AppState>,
    Json(request): Json<RebuildRequest>,
) -> ApiResult<impl IntoResponse> {
    let mode = parse_mode(&request.mode)?;
    let stats = state
        .engine
        .rebuild_index(
            mode,
            RebuildOptions {
                dry_run: request.dry_run,
                skip_thumbnail_caching: request.skip_thumbnail_caching,
            },
            &state.shutdown.child_token(),
        )
        .await?;
    Ok(Json(RebuildResponse {
        total: stats.total,
        rebuilt: stats.rebuilt,
        skipped: stats.skipped,
        duration_ms: stats.duration.as_millis() as u64,
        peak_memory_bytes: stats.peak_memory_bytes,
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyRequest {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    pub missing: Vec<CollectionId>,
    pub outdated: Vec<CollectionId>,
    pub orphaned: Vec<CollectionId>,
    pub missing_thumbnails: Vec<CollectionId>,
    pub to_add: usize,
    pub to_update: usize,
    pub to_remove: usize,
    pub is_consistent: bool,
    pub duration_ms: u64,
}

impl From<VerifyReport> for VerifyResponse {
    fn from(report: VerifyReport) -> Self {
        Self {
            missing: report.missing_in_index,
            outdated: report.outdated_in_index,
            orphaned: report.orphaned_in_index,
            missing_thumbnails: report.missing_thumbnails,
            to_add: report.to_add,
            to_update: report.to_update,
            to_remove: report.to_remove,
            is_consistent: report.is_consistent,
            duration_ms: report.duration.as_millis() as u64,
        }
    }
}

pub async fn verify_index(
    State(state): State<AppState>,
    Json(request): Json<VerifyRequest>,
) -> ApiResult<impl IntoResponse> {
    let report = state
        .engine
        .verify_index(request.dry_run, &state.shutdown.child_token())
        .await?;
    Ok(Json(VerifyResponse::from(report)))
}

/// Dashboard snapshot, rebuilt on demand when the cached one expired.
pub async fn dashboard_statistics(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    if let Some(stats) = state.engine.dashboard().await? {
        return Ok(Json(stats));
    }
    let stats = state
        .engine
        .build_dashboard(&state.shutdown.child_token())
        .await?;
    state.engine.store_dashboard(&stats).await?;
    Ok(Json(stats))
}

pub async fn recent_activity(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.engine.recent_activity().await?))
}
