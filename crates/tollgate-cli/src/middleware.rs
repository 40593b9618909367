//! Gateway stages: CORS gate, rate limiting, token verification, plus
//! request logging and request ids.

use crate::{ApiError, AppState};
use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tollgate_core::{
    extract_token, with_timeout, Admission, CorsDecision, LimitPolicy, RateKey, Tier,
};
use tracing::debug;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REQUEST_ID: &str = "x-request-id";

const RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("ratelimit-limit");
const RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("ratelimit-remaining");
const RATELIMIT_RESET: HeaderName = HeaderName::from_static("ratelimit-reset");

const PREFLIGHT_METHODS: &str = "GET,HEAD,PUT,PATCH,POST,DELETE";
const PREFLIGHT_MAX_AGE_SECS: u64 = 600;

// ==================== CORS ====================

/// Attach credentialed CORS headers when the origin belongs to a tenant
///
/// Unregistered or missing origins pass through untouched. Preflights from
/// registered origins are answered here.
pub async fn cors_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let decision = state.cors.resolve(origin.as_deref()).await;

    if let CorsDecision::Allow { origin } = &decision {
        if is_preflight(&request) {
            let mut response = StatusCode::NO_CONTENT.into_response();
            let headers = response.headers_mut();
            apply_cors(headers, origin);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(PREFLIGHT_METHODS),
            );
            if let Some(requested) = request.headers().get(header::ACCESS_CONTROL_REQUEST_HEADERS) {
                headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
            }
            headers.insert(
                header::ACCESS_CONTROL_MAX_AGE,
                HeaderValue::from(PREFLIGHT_MAX_AGE_SECS),
            );
            return response;
        }
    }

    let mut response = next.run(request).await;
    if origin.is_some() {
        response
            .headers_mut()
            .append(header::VARY, HeaderValue::from_static("origin"));
    }
    if let CorsDecision::Allow { origin } = &decision {
        apply_cors(response.headers_mut(), origin);
    }
    response
}

fn is_preflight(request: &Request) -> bool {
    request.method() == Method::OPTIONS
        && request
            .headers()
            .contains_key(header::ACCESS_CONTROL_REQUEST_METHOD)
}

fn apply_cors(headers: &mut HeaderMap, origin: &str) {
    if let Ok(value) = HeaderValue::from_str(origin) {
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
    }
}

// ==================== Rate limiting ====================

/// Fixed quota keyed by caller IP
pub async fn per_ip_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let key = RateKey::Ip(client_ip(&request, state.config.trust_forwarded_for));
    let limit = state.limits.resolve(LimitPolicy::PerIp, None);
    admit(&state, key, limit, request, next).await
}

/// Quota from the caller's tenant tier, keyed by tenant
///
/// The tenant comes from a `clientSecret` in the JSON body, else from a
/// verifiable token. Callers identified by neither are counted per IP at the
/// free limit under a key of their own. Lookups finish before any counter moves, so a failed or timed
/// out lookup leaves no admission behind.
pub async fn tiered_rate_limit(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let ip = client_ip(&request, state.config.trust_forwarded_for);
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, state.config.max_body_size)
        .await
        .map_err(|_| ApiError::bad_request("request body too large"))?;

    let secret = client_secret(&bytes);
    let authorization = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let (key, limit) = resolve_tiered(&state, secret.as_deref(), authorization, ip).await?;

    let request = Request::from_parts(parts, Body::from(bytes));
    admit(&state, key, limit, request, next).await
}

async fn resolve_tiered(
    state: &AppState,
    secret: Option<&str>,
    authorization: Option<&str>,
    ip: IpAddr,
) -> Result<(RateKey, u32), ApiError> {
    let timeout = state.config.registry_timeout();

    if let Some(secret) = secret {
        let found = with_timeout(timeout, state.registry.find_by_secret(secret))
            .await
            .map_err(|e| {
                tracing::error!(stage = "tier-resolution", lookup = "secret", error = %e, "Tenant lookup failed");
                ApiError::registry("tier-resolution", e)
            })?;
        if let Some(tenant) = found {
            debug!(tenant_id = %tenant.id, tier = tenant.tier.as_str(), "Tier resolved from client secret");
            return Ok((RateKey::Tenant(tenant.id), state.limits.for_tier(tenant.tier)));
        }
    }

    let claims = extract_token(authorization)
        .ok()
        .and_then(|token| state.tokens.verify(token).ok());
    if let Some(claims) = claims {
        let tenant = with_timeout(timeout, state.registry.find_by_id(&claims.tenant_id))
            .await
            .map_err(|e| {
                tracing::error!(
                    stage = "tier-resolution",
                    tenant_id = %claims.tenant_id,
                    error = %e,
                    "Tenant lookup failed"
                );
                ApiError::registry("tier-resolution", e)
            })?;
        // An authenticated caller without a stored record is billed as free.
        let tier = tenant.map(|t| t.tier).unwrap_or(Tier::Free);
        return Ok((RateKey::Tenant(claims.tenant_id), state.limits.for_tier(tier)));
    }

    Ok((RateKey::AnonymousIp(ip), state.limits.resolve(LimitPolicy::Tiered, None)))
}

#[derive(Deserialize)]
struct SecretBody {
    #[serde(rename = "clientSecret")]
    client_secret: Option<String>,
}

fn client_secret(body: &[u8]) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<SecretBody>(body)
        .ok()
        .and_then(|b| b.client_secret)
        .filter(|s| !s.is_empty())
}

async fn admit(
    state: &AppState,
    key: RateKey,
    limit: u32,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let admission = state.limiter.admit(&key, limit);
    let reset_after = admission.reset_after_secs(state.limiter.now());

    if !admission.is_admitted() {
        debug!(key = %key, limit, "Rate limit exceeded");
        let rejection = ApiError::RateLimited {
            limit,
            window_secs: state.limiter.window_size().num_seconds().max(1) as u64,
            retry_after_secs: reset_after,
        };
        let mut response = rejection.into_response();
        set_rate_headers(response.headers_mut(), &admission, reset_after);
        return Ok(response);
    }

    let mut response = next.run(request).await;
    set_rate_headers(response.headers_mut(), &admission, reset_after);
    Ok(response)
}

fn set_rate_headers(headers: &mut HeaderMap, admission: &Admission, reset_after: u64) {
    headers.insert(RATELIMIT_LIMIT, HeaderValue::from(admission.limit()));
    headers.insert(RATELIMIT_REMAINING, HeaderValue::from(admission.remaining()));
    headers.insert(RATELIMIT_RESET, HeaderValue::from(reset_after));
}

/// Caller address used for per-IP limits
pub fn client_ip(request: &Request, trust_forwarded_for: bool) -> IpAddr {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get(X_FORWARDED_FOR)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok());
        if let Some(ip) = forwarded {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

// ==================== Authentication ====================

/// Verify the bearer token and expose its claims to handlers
pub async fn verify_token(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let authorization = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    let claims = extract_token(authorization)
        .and_then(|token| state.tokens.verify(token))
        .map_err(|e| {
            debug!(error = %e, "Token rejected");
            ApiError::from(e)
        })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

// ==================== Observability ====================

/// Request ID middleware - adds x-request-id header
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(X_REQUEST_ID, value);
    }
    response
}

/// Request ID extension
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

/// Logging middleware
pub async fn logging_middleware(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = std::time::Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    tracing::info!(
        request_id = %request_id,
        method = %method,
        uri = %uri,
        status = %status.as_u16(),
        duration_ms = %duration.as_millis(),
        "Request completed"
    );

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn request_with(headers: &[(&str, &str)], peer: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/v2/test");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let mut request = builder.body(Body::empty()).unwrap();
        if let Some(peer) = peer {
            let addr: SocketAddr = peer.parse().unwrap();
            request.extensions_mut().insert(ConnectInfo(addr));
        }
        request
    }

    #[test]
    fn test_client_ip_from_connect_info() {
        let request = request_with(&[], Some("192.0.2.7:5555"));
        assert_eq!(client_ip(&request, false), "192.0.2.7".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_forwarded_for_only_when_trusted() {
        let request = request_with(&[(X_FORWARDED_FOR, "203.0.113.9, 10.0.0.1")], Some("10.0.0.1:80"));
        assert_eq!(client_ip(&request, true), "203.0.113.9".parse::<IpAddr>().unwrap());
        assert_eq!(client_ip(&request, false), "10.0.0.1".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_client_ip_fallback() {
        let request = request_with(&[(X_FORWARDED_FOR, "garbage")], None);
        assert_eq!(client_ip(&request, true), IpAddr::V4(Ipv4Addr::UNSPECIFIED));
    }

    #[rstest]
    #[case(br#"{"clientSecret":"abc"}"#.as_slice(), Some("abc"))]
    #[case(br#"{"clientSecret":""}"#.as_slice(), None)]
    #[case(br#"{"other":1}"#.as_slice(), None)]
    #[case(b"not json".as_slice(), None)]
    #[case(b"".as_slice(), None)]
    fn test_client_secret(#[case] body: &[u8], #[case] expected: Option<&str>) {
        assert_eq!(client_secret(body).as_deref(), expected);
    }

    #[test]
    fn test_preflight_detection() {
        let mut request = request_with(&[("access-control-request-method", "GET")], None);
        *request.method_mut() = Method::OPTIONS;
        assert!(is_preflight(&request));

        let mut plain = request_with(&[], None);
        *plain.method_mut() = Method::OPTIONS;
        assert!(!is_preflight(&plain));
    }
}
