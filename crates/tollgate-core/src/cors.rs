//! Tenant-aware origin resolution
//!
//! The gate only decides; attaching headers is the transport's job.

use crate::tenant::{with_timeout, TenantRegistry};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Per-request cross-origin decision
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CorsDecision {
    /// Reflect this exact origin with credentials allowed
    Allow { origin: String },
    /// Attach no CORS headers
    Omit,
}

impl CorsDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Lowercase a host and strip one leading `www.` label
pub fn normalize_host(host: &str) -> String {
    let host = host.trim().to_ascii_lowercase();
    let stripped = host
        .strip_prefix("www.")
        .filter(|rest| !rest.is_empty())
        .map(str::to_string);
    stripped.unwrap_or(host)
}

/// Registry lookup key for an `Origin` header value
///
/// Keeps an explicit non-default port. Returns `None` for `null`, opaque or
/// unparsable origins.
pub fn origin_host(origin: &str) -> Option<String> {
    let url = Url::parse(origin.trim()).ok()?;
    let host = url.host_str()?;
    if host.is_empty() {
        return None;
    }
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    Some(normalize_host(&host))
}

/// Resolves origins against registered tenant hosts
///
/// Registry failures and timeouts fail open: they are logged and treated as
/// an unregistered origin.
#[derive(Clone)]
pub struct CorsGate {
    registry: Arc<dyn TenantRegistry>,
    timeout: Duration,
}

impl CorsGate {
    pub fn new(registry: Arc<dyn TenantRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub async fn resolve(&self, origin: Option<&str>) -> CorsDecision {
        let Some(origin) = origin else {
            return CorsDecision::Omit;
        };
        let Some(host) = origin_host(origin) else {
            tracing::debug!(origin, "Ignoring unparsable origin");
            return CorsDecision::Omit;
        };

        match with_timeout(self.timeout, self.registry.find_by_host(&host)).await {
            Ok(Some(tenant)) => {
                tracing::debug!(host = %host, tenant_id = %tenant.id, "Origin matches tenant");
                CorsDecision::Allow {
                    origin: origin.trim().to_string(),
                }
            }
            Ok(None) => CorsDecision::Omit,
            Err(e) => {
                tracing::warn!(stage = "cors", host = %host, error = %e, "Tenant lookup failed; omitting CORS headers");
                CorsDecision::Omit
            }
        }
    }
}
