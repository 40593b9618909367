//! Error types for the tollgate-core crate

use thiserror::Error;

/// Result type alias using `RegistryError`
pub type Result<T> = std::result::Result<T, RegistryError>;

/// Errors raised by a tenant registry backend
#[derive(Error, Debug, Clone)]
pub enum RegistryError {
    /// Backend could not be reached or returned an I/O failure
    #[error("tenant registry unavailable: {0}")]
    Unavailable(String),

    /// Lookup did not complete within the configured bound
    #[error("tenant registry lookup timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// Another tenant already owns this host
    #[error("host already registered: {0}")]
    DuplicateHost(String),

    /// Another tenant already owns this secret
    #[error("client secret already registered")]
    DuplicateSecret,

    /// Stored record could not be decoded
    #[error("invalid tenant record: {0}")]
    InvalidRecord(String),
}

/// Token verification and issuance failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// Signature checks out but the token is past its expiry
    #[error("token has expired")]
    Expired,

    /// Bad signature, malformed structure, wrong issuer or missing token
    #[error("invalid token")]
    Invalid,

    /// Requested lifetime would not produce `expiresAt > issuedAt`
    #[error("token lifetime must be at least one second")]
    InvalidTtl,

    /// Signing failed
    #[error("token signing failed: {0}")]
    Signing(String),
}
