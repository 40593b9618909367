//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tollgate_core::RateLimits;

/// Longest token lifetime accepted (one year)
pub const MAX_TOKEN_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Longest rate window accepted (one day)
pub const MAX_RATE_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// Invalid or incomplete configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("JWT secret is not configured")]
    MissingSecret,

    #[error("{0} must be greater than zero")]
    Zero(&'static str),

    #[error("{field} must not exceed {max}")]
    TooLarge { field: &'static str, max: u64 },

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

/// Gateway server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Process-wide token signing secret
    pub jwt_secret: Option<String>,
    /// Lifetime of issued tokens (seconds)
    pub token_ttl_secs: u64,
    /// Rate window length (milliseconds)
    pub rate_window_ms: u64,
    /// Requests per window for free tenants
    pub free_limit: u32,
    /// Requests per window for premium tenants
    pub premium_limit: u32,
    /// Requests per window per caller IP on fixed-limit routes
    pub ip_limit: u32,
    /// Upper bound on a single tenant registry lookup (milliseconds)
    pub registry_timeout_ms: u64,
    /// How often idle rate windows are swept (seconds)
    pub sweep_interval_secs: u64,
    /// Take the caller IP from `X-Forwarded-For`
    pub trust_forwarded_for: bool,
    /// JSON file of tenant records to seed the registry with
    pub tenants_file: Option<String>,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let limits = RateLimits::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 8002,
            jwt_secret: None,
            token_ttl_secs: 30 * 60,
            rate_window_ms: 60 * 1000,
            free_limit: limits.free,
            premium_limit: limits.premium,
            ip_limit: limits.per_ip,
            registry_timeout_ms: 2000,
            sweep_interval_secs: 60,
            trust_forwarded_for: false,
            tenants_file: None,
            max_body_size: 1024 * 1024, // 1 MiB
        }
    }
}

impl GatewayConfig {
    /// Layer defaults, an optional config file and `TOLLGATE_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let loaded = builder
            .add_source(config::Environment::with_prefix("TOLLGATE").try_parsing(true))
            .build()?
            .try_deserialize()?;
        Ok(loaded)
    }

    /// Check the invariants the gateway relies on at startup
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.jwt_secret.as_deref() {
            Some(secret) if !secret.is_empty() => {}
            _ => return Err(ConfigError::MissingSecret),
        }
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::Zero("token_ttl_secs"));
        }
        if self.token_ttl_secs > MAX_TOKEN_TTL_SECS {
            return Err(ConfigError::TooLarge {
                field: "token_ttl_secs",
                max: MAX_TOKEN_TTL_SECS,
            });
        }
        if self.rate_window_ms == 0 {
            return Err(ConfigError::Zero("rate_window_ms"));
        }
        if self.rate_window_ms > MAX_RATE_WINDOW_MS {
            return Err(ConfigError::TooLarge {
                field: "rate_window_ms",
                max: MAX_RATE_WINDOW_MS,
            });
        }
        if self.free_limit == 0 || self.premium_limit == 0 || self.ip_limit == 0 {
            return Err(ConfigError::Zero("rate limits"));
        }
        if self.registry_timeout_ms == 0 {
            return Err(ConfigError::Zero("registry_timeout_ms"));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Zero("sweep_interval_secs"));
        }
        Ok(())
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn limits(&self) -> RateLimits {
        RateLimits {
            free: self.free_limit,
            premium: self.premium_limit,
            per_ip: self.ip_limit,
        }
    }

    pub fn token_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.token_ttl_secs as i64)
    }

    pub fn rate_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.rate_window_ms as i64)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_millis(self.registry_timeout_ms)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}
