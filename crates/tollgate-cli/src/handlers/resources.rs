//! Resource handlers delegating to the business backend

use crate::error::GatewayErrorCode;
use crate::{ApiError, AppState};
use axum::{
    extract::{Extension, Path, State},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tollgate_core::TokenClaims;

fn user_of(claims: &TokenClaims) -> Result<&str, ApiError> {
    claims
        .user_id
        .as_deref()
        .ok_or_else(|| ApiError::new(GatewayErrorCode::InvalidToken, "token carries no user identity"))
}

fn wrap(result: anyhow::Result<Value>) -> Result<Json<Value>, ApiError> {
    result
        .map(|payload| Json(json!({ "code": 200, "payload": payload })))
        .map_err(|e| ApiError::Internal(format!("backend: {e:#}")))
}

/// GET /v2/posts/my
pub async fn my_posts(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<TokenClaims>,
) -> Result<Json<Value>, ApiError> {
    let user = user_of(&claims)?;
    wrap(state.backend.my_posts(user).await)
}

/// GET /v2/posts/hashtag/{title}
pub async fn posts_by_hashtag(
    State(state): State<Arc<AppState>>,
    Path(title): Path<String>,
) -> Result<Json<Value>, ApiError> {
    wrap(state.backend.posts_by_hashtag(&title).await)
}

/// GET /v2/followers/my
pub async fn my_followers(
    State(state): State<Arc<AppState>>,
    Extension(claims): Extension<TokenClaims>,
) -> Result<Json<Value>, ApiError> {
    let user = user_of(&claims)?;
    wrap(state.backend.my_followers(user).await)
}
