//! Token issuance and inspection

use crate::error::GatewayErrorCode;
use crate::{ApiError, AppState};
use axum::{
    body::Bytes,
    extract::{Extension, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tollgate_core::{with_timeout, TokenClaims};
use tracing::{debug, error, info};

/// Body of `POST /v2/token`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest {
    pub client_secret: Option<String>,
}

/// Successful issuance
#[derive(Debug, Serialize)]
pub struct IssueTokenResponse {
    pub code: u16,
    pub message: &'static str,
    pub token: String,
}

/// POST /v2/token - exchange a client secret for a bearer token
pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<IssueTokenResponse>, ApiError> {
    let request: IssueTokenRequest = serde_json::from_slice(&body)
        .map_err(|_| ApiError::bad_request("request body must be a JSON object"))?;
    let secret = request
        .client_secret
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("clientSecret is required"))?;

    let tenant = with_timeout(
        state.config.registry_timeout(),
        state.registry.find_by_secret(&secret),
    )
    .await
    .map_err(|e| {
        error!(stage = "token-issuance", error = %e, "Tenant lookup failed");
        ApiError::registry("token-issuance", e)
    })?
    .ok_or_else(|| {
        debug!("Token requested with unknown client secret");
        ApiError::code(GatewayErrorCode::UnknownClientSecret)
    })?;

    let token = state
        .tokens
        .issue(&tenant.id, tenant.owner_id.as_deref(), state.config.token_ttl())?;
    info!(tenant_id = %tenant.id, host = %tenant.host, tier = tenant.tier.as_str(), "Issued token");

    Ok(Json(IssueTokenResponse {
        code: 200,
        message: "token issued",
        token,
    }))
}

/// GET /v2/test - echo the verified claims
pub async fn token_test(Extension(claims): Extension<TokenClaims>) -> Json<Value> {
    Json(json!({ "code": 200, "payload": claims }))
}
