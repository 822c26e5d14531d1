use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lumina_core::auth::verify_password;
use lumina_model::RefreshToken;

use crate::errors::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in_secs: i64,
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> ApiResult<impl IntoResponse> {
    let user = state
        .users
        .find_by_username(&request.username)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(|| ApiError::unauthorized("invalid credentials"))?;

    if !verify_password(&request.password, &user.password_hash)? {
        return Err(ApiError::unauthorized("invalid credentials"));
    }

    issue_tokens(&state, &user).await
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    State(state): State<AppState>,
    Json(request): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let stored = state
        .refresh_tokens
        .find_valid(&request.refresh_token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid refresh token"))?;

    let user = state
        .users
        .get(stored.user_id)
        .await?
        .filter(|u| u.is_active && !u.is_deleted)
        .ok_or_else(|| ApiError::unauthorized("invalid refresh token"))?;

    // Rotate: the presented token is spent either way.
    state.refresh_tokens.revoke(&request.refresh_token).await?;
    issue_tokens(&state, &user).await
}

async fn issue_tokens(
    state: &AppState,
    user: &lumina_model::User,
) -> ApiResult<Json<TokenResponse>> {
    let access_token = state.tokens.issue_access_token(user)?;
    let refresh_value = state.tokens.new_refresh_token()?;
    let now = Utc::now();
    state
        .refresh_tokens
        .insert(&RefreshToken {
            id: Uuid::new_v4(),
            user_id: user.id,
            token: refresh_value.clone(),
            created_at: now,
            expires_at: now + Duration::days(state.config.auth.refresh_ttl_days),
            revoked_at: None,
        })
        .await?;

    Ok(Json(TokenResponse {
        access_token,
        refresh_token: refresh_value,
        expires_in_secs: state.config.auth.access_ttl_mins * 60,
    }))
}
