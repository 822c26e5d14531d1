use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use lumina_model::{CollectionId, CollectionType};

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

use super::ListParams;

fn parse_id(raw: &str) -> ApiResult<CollectionId> {
    CollectionId::parse_str(raw)
        .map_err(|e| ApiError::bad_request(format!("invalid collection id: {e}")))
}

pub async fn list_collections(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .engine
        .page(params.page, params.size, params.sort, params.dir)
        .await?;
    Ok(Json(page))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    #[serde(default)]
    pub q: Option<String>,
}

pub async fn search_collections(
    State(state): State<AppState>,
    Query(search): Query<SearchParams>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let q = search
        .q
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::bad_request("missing search query `q`"))?;
    let page = state
        .engine
        .search(q, params.page, params.size, params.sort, params.dir)
        .await?;
    Ok(Json(page))
}

pub async fn navigation(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let nav = state.engine.navigation(id, params.sort, params.dir).await?;
    Ok(Json(nav))
}

pub async fn siblings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let page = state
        .engine
        .siblings(id, params.page, params.size, params.sort, params.dir)
        .await?;
    Ok(Json(page))
}

pub async fn list_libraries(
    State(state): State<AppState>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.libraries.list_active().await?))
}

pub async fn by_library(
    State(state): State<AppState>,
    Path(library_id): Path<Uuid>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let page = state
        .engine
        .page_by_library(library_id, params.page, params.size, params.sort, params.dir)
        .await?;
    Ok(Json(page))
}

pub async fn by_type(
    State(state): State<AppState>,
    Path(type_name): Path<String>,
    Query(params): Query<ListParams>,
) -> ApiResult<impl IntoResponse> {
    let collection_type = CollectionType::parse(&type_name).ok_or_else(|| {
        ApiError::bad_request(format!("unknown collection type {type_name}"))
    })?;
    let page = state
        .engine
        .page_by_type(
            collection_type,
            params.page,
            params.size,
            params.sort,
            params.dir,
        )
        .await?;
    Ok(Json(page))
}

/// Raw cached thumbnail bytes. The blob cache stores whatever the inline
/// pipeline produced, which is JPEG unless configured otherwise.
pub async fn thumbnail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let id = parse_id(&id)?;
    let bytes = state
        .engine
        .cached_thumbnail(id)
        .await?
        .ok_or_else(|| {
            ApiError::not_found(format!("no cached thumbnail for {id}"))
        })?;
    Ok(([(header::CONTENT_TYPE, "image/jpeg")], bytes))
}
