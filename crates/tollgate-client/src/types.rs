//! Wire types of the v2 API

use serde::{Deserialize, Serialize};

/// Body of a token request
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IssueTokenRequest<'a> {
    pub client_secret: &'a str,
}

/// Successful token issuance
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedToken {
    pub code: u16,
    pub message: String,
    pub token: String,
}

/// Claims echoed by `GET /v2/test`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub tenant_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(rename = "iat")]
    pub issued_at: i64,
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// `{ code, payload }` wrapper of successful data responses
#[derive(Debug, Clone, Deserialize)]
pub struct Payload<T> {
    pub code: u16,
    pub payload: T,
}
