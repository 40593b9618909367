//! Retired API surface and unmatched paths

use crate::error::GatewayErrorCode;
use crate::ApiError;

/// ANY /v1/* - the legacy version only answers with a deprecation notice
pub async fn deprecated() -> ApiError {
    ApiError::deprecated()
}

/// Fallback for paths no version serves
pub async fn not_found() -> ApiError {
    ApiError::code(GatewayErrorCode::NotFound)
}
