//! Bearer token issuance and verification

use crate::clock::{SharedClock, SystemClock};
use crate::error::TokenError;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Issuer stamped into every token
pub const ISSUER: &str = "tollgate";

/// Identity carried by a verified token
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenClaims {
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Unix seconds
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// Unix seconds
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

impl TokenClaims {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.expires_at
    }
}

#[derive(Serialize, Deserialize)]
struct WireClaims {
    iss: String,
    #[serde(flatten)]
    claims: TokenClaims,
}

/// Signs and verifies HS256 bearer tokens with the process-wide secret
///
/// Verification holds no mutable state, so one instance is shared by every
/// request.
#[derive(Clone)]
pub struct TokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    clock: SharedClock,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService").finish_non_exhaustive()
    }
}

impl TokenService {
    pub fn new(secret: &str) -> Self {
        Self::with_clock(secret, Arc::new(SystemClock))
    }

    pub fn with_clock(secret: &str, clock: SharedClock) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against our own clock after the signature passes.
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "iss"]);
        validation.set_issuer(&[ISSUER]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            clock,
        }
    }

    /// Issue a token valid for `ttl` from now
    pub fn issue(&self, tenant_id: &str, user_id: Option<&str>, ttl: Duration) -> Result<String, TokenError> {
        self.issue_at(tenant_id, user_id, ttl, self.clock.now())
    }

    pub fn issue_at(
        &self,
        tenant_id: &str,
        user_id: Option<&str>,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, TokenError> {
        if ttl.num_seconds() < 1 {
            return Err(TokenError::InvalidTtl);
        }

        let issued_at = now.timestamp();
        let wire = WireClaims {
            iss: ISSUER.to_string(),
            claims: TokenClaims {
                tenant_id: tenant_id.to_string(),
                user_id: user_id.map(str::to_string),
                issued_at,
                expires_at: issued_at + ttl.num_seconds(),
            },
        };

        encode(&Header::new(Algorithm::HS256), &wire, &self.encoding)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify a token against the current time
    pub fn verify(&self, token: &str) -> Result<TokenClaims, TokenError> {
        self.verify_at(token, self.clock.now())
    }

    /// Verify signature and structure first, then expiry at `now`
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<TokenClaims, TokenError> {
        if token.is_empty() {
            return Err(TokenError::Invalid);
        }

        let claims = decode::<WireClaims>(token, &self.decoding, &self.validation)
            .map(|data| data.claims.claims)
            .map_err(|e| {
                tracing::debug!("Token validation failed: {}", e);
                TokenError::Invalid
            })?;

        if claims.is_expired_at(now) {
            return Err(TokenError::Expired);
        }

        Ok(claims)
    }
}

/// Pull the token out of an `Authorization` header value
///
/// The raw value is the token; a `Bearer ` prefix is tolerated.
pub fn extract_token(header: Option<&str>) -> Result<&str, TokenError> {
    let raw = header.map(str::trim_start).ok_or(TokenError::Invalid)?;
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .unwrap_or(raw)
        .trim();

    if token.is_empty() {
        Err(TokenError::Invalid)
    } else {
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const SECRET: &str = "test-secret";

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn test_issue_and_verify() {
        let service = TokenService::new(SECRET);
        let token = service.issue("tenant-1", Some("user-9"), Duration::minutes(30)).unwrap();

        let claims = service.verify(&token).unwrap();
        assert_eq!(claims.tenant_id, "tenant-1");
        assert_eq!(claims.user_id.as_deref(), Some("user-9"));
        assert_eq!(claims.expires_at - claims.issued_at, 1800);
    }

    #[rstest]
    #[case(0, true)]
    #[case(59, true)]
    #[case(60, false)]
    #[case(3600, false)]
    fn test_expiry_boundary(#[case] offset: i64, #[case] valid: bool) {
        let service = TokenService::new(SECRET);
        let issued = at(1_700_000_000);
        let token = service.issue_at("t", None, Duration::seconds(60), issued).unwrap();

        let result = service.verify_at(&token, issued + Duration::seconds(offset));
        if valid {
            assert!(result.is_ok());
        } else {
            assert_eq!(result.unwrap_err(), TokenError::Expired);
        }
    }

    #[test]
    fn test_corrupted_signature_is_invalid_not_expired() {
        let service = TokenService::new(SECRET);
        let issued = at(1_700_000_000);
        let token = service.issue_at("t", None, Duration::seconds(60), issued).unwrap();

        let sig_start = token.rfind('.').unwrap() + 1;
        let original = token.as_bytes()[sig_start];
        let replacement = if original == b'A' { "B" } else { "A" };
        let mut corrupted = token.clone();
        corrupted.replace_range(sig_start..sig_start + 1, replacement);

        // Past expiry too: a bad signature must never surface as expired.
        let later = issued + Duration::hours(2);
        assert_eq!(service.verify_at(&corrupted, later).unwrap_err(), TokenError::Invalid);
        assert_eq!(service.verify_at(&corrupted, issued).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_wrong_secret_is_invalid() {
        let issuer = TokenService::new("one");
        let verifier = TokenService::new("two");
        let token = issuer.issue("t", None, Duration::minutes(1)).unwrap();
        assert_eq!(verifier.verify(&token).unwrap_err(), TokenError::Invalid);
    }

    #[rstest]
    #[case("")]
    #[case("garbage")]
    #[case("a.b.c")]
    fn test_malformed_is_invalid(#[case] token: &str) {
        let service = TokenService::new(SECRET);
        assert_eq!(service.verify(token).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_foreign_issuer_rejected() {
        let foreign = encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({
                "iss": "someone-else",
                "tenantId": "t",
                "iat": Utc::now().timestamp(),
                "exp": Utc::now().timestamp() + 60,
            }),
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        let service = TokenService::new(SECRET);
        assert_eq!(service.verify(&foreign).unwrap_err(), TokenError::Invalid);
    }

    #[test]
    fn test_sub_second_ttl_rejected() {
        let service = TokenService::new(SECRET);
        let err = service.issue("t", None, Duration::milliseconds(500)).unwrap_err();
        assert_eq!(err, TokenError::InvalidTtl);
    }

    #[test]
    fn test_uses_injected_clock() {
        let clock = Arc::new(crate::clock::ManualClock::new(at(1_700_000_000)));
        let service = TokenService::with_clock(SECRET, clock.clone());
        let token = service.issue("t", None, Duration::seconds(10)).unwrap();

        assert!(service.verify(&token).is_ok());
        clock.advance(Duration::seconds(10));
        assert_eq!(service.verify(&token).unwrap_err(), TokenError::Expired);
    }

    #[rstest]
    #[case(Some("abc123"), Ok("abc123"))]
    #[case(Some("Bearer abc123"), Ok("abc123"))]
    #[case(Some("bearer abc123"), Ok("abc123"))]
    #[case(Some("  abc123 "), Ok("abc123"))]
    #[case(Some(""), Err(TokenError::Invalid))]
    #[case(Some("Bearer "), Err(TokenError::Invalid))]
    #[case(None, Err(TokenError::Invalid))]
    fn test_extract_token(#[case] header: Option<&str>, #[case] expected: Result<&str, TokenError>) {
        assert_eq!(extract_token(header), expected);
    }
}
