//! Application state

use crate::backend::{ApiBackend, EmptyBackend};
use crate::config::{ConfigError, GatewayConfig};
use std::sync::Arc;
use tollgate_core::{
    CorsGate, MemoryTenantRegistry, RateLimiterRegistry, RateLimits, SharedClock, SystemClock,
    TenantRegistry, TokenService,
};
use tracing::{info, warn};

/// Application state shared across handlers
pub struct AppState {
    /// Gateway configuration
    pub config: GatewayConfig,
    /// Token signing and verification
    pub tokens: TokenService,
    /// The one rate window registry for the whole process
    pub limiter: Arc<RateLimiterRegistry>,
    /// Per-tier limits
    pub limits: RateLimits,
    /// Tenant lookups
    pub registry: Arc<dyn TenantRegistry>,
    /// Origin resolution
    pub cors: CorsGate,
    /// Business handlers
    pub backend: Arc<dyn ApiBackend>,
}

impl AppState {
    /// Create state from configuration, seeding an in-memory registry
    pub async fn new(config: GatewayConfig) -> anyhow::Result<Self> {
        let registry = match &config.tenants_file {
            Some(path) => {
                let registry = MemoryTenantRegistry::from_json_file(path)?;
                info!("Loaded {} tenants from {}", registry.len(), path);
                registry
            }
            None => {
                warn!("No tenants file configured; every tenant lookup will miss");
                MemoryTenantRegistry::new()
            }
        };

        Ok(Self::from_parts(
            config,
            Arc::new(registry),
            Arc::new(EmptyBackend),
            Arc::new(SystemClock),
        )?)
    }

    /// Assemble state from explicit collaborators
    pub fn from_parts(
        config: GatewayConfig,
        registry: Arc<dyn TenantRegistry>,
        backend: Arc<dyn ApiBackend>,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let secret = config.jwt_secret.as_deref().ok_or(ConfigError::MissingSecret)?;

        let tokens = TokenService::with_clock(secret, Arc::clone(&clock));
        let limiter = Arc::new(RateLimiterRegistry::with_clock(config.rate_window(), clock));
        let cors = CorsGate::new(Arc::clone(&registry), config.registry_timeout());

        Ok(Self {
            limits: config.limits(),
            config,
            tokens,
            limiter,
            registry,
            cors,
            backend,
        })
    }
}
