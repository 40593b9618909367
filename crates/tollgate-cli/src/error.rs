//! Error types and the JSON error envelope

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tollgate_core::{RegistryError, TokenError};

/// Caller-visible gateway error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayErrorCode {
    BadRequest,
    InvalidToken,
    ExpiredToken,
    UnknownClientSecret,
    DeprecatedEndpoint,
    NotFound,
    RateLimitExceeded,
    TenantLookupFault,
    InternalError,
}

impl GatewayErrorCode {
    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest => StatusCode::BAD_REQUEST,
            Self::InvalidToken | Self::UnknownClientSecret => StatusCode::UNAUTHORIZED,
            // Non-standard "authentication timeout", kept distinct from 401
            Self::ExpiredToken => StatusCode::from_u16(419).unwrap_or(StatusCode::UNAUTHORIZED),
            Self::DeprecatedEndpoint => StatusCode::GONE,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            Self::TenantLookupFault | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown when no more specific one is given
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::BadRequest => "bad request",
            Self::InvalidToken => "invalid token",
            Self::ExpiredToken => "token has expired",
            Self::UnknownClientSecret => "unregistered client secret",
            Self::DeprecatedEndpoint => "this API version is retired; please use the new version",
            Self::NotFound => "not found",
            Self::RateLimitExceeded => "rate limit exceeded",
            Self::TenantLookupFault | Self::InternalError => "internal server error",
        }
    }
}

/// Uniform body for every gateway-rejected request
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: u16,
    pub message: String,
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Gateway {
        code: GatewayErrorCode,
        message: String,
    },

    #[error("only {limit} requests allowed per {window_secs} seconds")]
    RateLimited {
        limit: u32,
        window_secs: u64,
        retry_after_secs: u64,
    },

    #[error("tenant registry fault during {stage}: {source}")]
    Registry {
        stage: &'static str,
        #[source]
        source: RegistryError,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self::Gateway {
            code,
            message: message.into(),
        }
    }

    pub fn code(code: GatewayErrorCode) -> Self {
        Self::new(code, code.default_message())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::BadRequest, message)
    }

    pub fn deprecated() -> Self {
        Self::code(GatewayErrorCode::DeprecatedEndpoint)
    }

    /// Registry lookup failed at a stage that must fail closed
    pub fn registry(stage: &'static str, source: RegistryError) -> Self {
        Self::Registry { stage, source }
    }

    /// Get the error code
    pub fn error_code(&self) -> GatewayErrorCode {
        match self {
            Self::Gateway { code, .. } => *code,
            Self::RateLimited { .. } => GatewayErrorCode::RateLimitExceeded,
            Self::Registry { .. } => GatewayErrorCode::TenantLookupFault,
            Self::Internal(_) => GatewayErrorCode::InternalError,
        }
    }

    /// Server faults not already logged where they were raised
    fn needs_logging(&self) -> bool {
        match self {
            Self::Registry { .. } => false,
            _ => self.error_code().status_code().is_server_error(),
        }
    }

    /// Message safe to show the caller
    fn public_message(&self) -> String {
        match self {
            Self::Gateway { message, .. } => message.clone(),
            Self::RateLimited { .. } => self.to_string(),
            Self::Registry { .. } | Self::Internal(_) => {
                self.error_code().default_message().to_string()
            }
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Expired => Self::code(GatewayErrorCode::ExpiredToken),
            TokenError::Invalid => Self::code(GatewayErrorCode::InvalidToken),
            TokenError::InvalidTtl | TokenError::Signing(_) => Self::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.status_code();

        if self.needs_logging() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = ErrorEnvelope {
            code: status.as_u16(),
            message: self.public_message(),
        };
        let mut response = (status, Json(body)).into_response();

        if let Self::RateLimited { retry_after_secs, .. } = &self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(*retry_after_secs));
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    async fn envelope(err: ApiError) -> (StatusCode, serde_json::Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[rstest]
    #[case(TokenError::Expired, 419)]
    #[case(TokenError::Invalid, 401)]
    #[case(TokenError::InvalidTtl, 500)]
    #[tokio::test]
    async fn test_token_errors_map_to_status(#[case] err: TokenError, #[case] status: u16) {
        let (actual, body) = envelope(err.into()).await;
        assert_eq!(actual.as_u16(), status);
        assert_eq!(body["code"], status);
    }

    #[test]
    fn test_registry_faults_are_not_logged_twice() {
        let registry = ApiError::registry("tier-resolution", RegistryError::Unavailable("down".into()));
        assert!(!registry.needs_logging());
        assert!(ApiError::Internal("backend".into()).needs_logging());
        assert!(!ApiError::code(GatewayErrorCode::InvalidToken).needs_logging());
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let (status, body) = envelope(ApiError::code(GatewayErrorCode::NotFound)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, serde_json::json!({ "code": 404, "message": "not found" }));
    }

    #[tokio::test]
    async fn test_deprecated_envelope() {
        let (status, body) = envelope(ApiError::deprecated()).await;
        assert_eq!(status, StatusCode::GONE);
        assert_eq!(body["code"], 410);
        assert_eq!(body["message"], GatewayErrorCode::DeprecatedEndpoint.default_message());
    }

    #[tokio::test]
    async fn test_rate_limited_echoes_limit_and_sets_retry_after() {
        let err = ApiError::RateLimited {
            limit: 10,
            window_secs: 60,
            retry_after_secs: 42,
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "42");

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 429);
        assert_eq!(body["message"], "only 10 requests allowed per 60 seconds");
    }

    #[tokio::test]
    async fn test_registry_fault_hides_detail() {
        let err = ApiError::registry(
            "token-issuance",
            RegistryError::Unavailable("connection refused on 10.0.0.5:5432".into()),
        );
        let (status, body) = envelope(err).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "internal server error");
    }
}
