//! Client error types

use serde::Deserialize;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, ClientError>;

/// Client errors
#[derive(Error, Debug)]
pub enum ClientError {
    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Gateway rejected the request with an error envelope
    #[error("API error ({code}): {message}")]
    Api {
        code: u16,
        message: String,
        /// Seconds until the rate window resets, on 429
        retry_after: Option<u64>,
    },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid response
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Deserialize)]
struct Envelope {
    code: u16,
    message: String,
}

impl ClientError {
    /// Parse a gateway error envelope, falling back to the HTTP status
    pub fn from_envelope(body: &str, status: u16, retry_after: Option<u64>) -> Self {
        match serde_json::from_str::<Envelope>(body) {
            Ok(envelope) => Self::Api {
                code: envelope.code,
                message: envelope.message,
                retry_after,
            },
            Err(_) => Self::Api {
                code: status,
                message: if body.is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.to_string()
                },
                retry_after,
            },
        }
    }

    /// Status code of an API rejection
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::Api { code, .. } => Some(*code),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// The token was well formed but past its expiry
    pub fn is_expired_token(&self) -> bool {
        self.code() == Some(419)
    }

    /// The token or client secret was rejected
    pub fn is_unauthorized(&self) -> bool {
        self.code() == Some(401)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code() == Some(429)
    }

    /// The endpoint belongs to a retired API version
    pub fn is_deprecated(&self) -> bool {
        self.code() == Some(410)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_envelope() {
        let error = ClientError::from_envelope(
            r#"{"code":419,"message":"token has expired"}"#,
            419,
            None,
        );
        match &error {
            ClientError::Api { code, message, .. } => {
                assert_eq!(*code, 419);
                assert_eq!(message, "token has expired");
            }
            _ => panic!("Expected Api error"),
        }
        assert!(error.is_expired_token());
        assert!(!error.is_unauthorized());
    }

    #[test]
    fn test_non_envelope_body_keeps_status() {
        let error = ClientError::from_envelope("", 502, None);
        assert_eq!(error.code(), Some(502));
        assert_eq!(error.to_string(), "API error (502): HTTP 502");
    }
}
