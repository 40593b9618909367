//! Client configuration

use std::time::Duration;

/// Client configuration
#[derive(Clone, Debug)]
pub struct Config {
    /// Gateway endpoint URL
    pub endpoint: String,
    /// Tenant client secret exchanged for tokens
    pub client_secret: String,
    /// Origin to present, for callers acting on behalf of a tenant site
    pub origin: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8002".to_string(),
            client_secret: String::new(),
            origin: None,
            timeout: Duration::from_secs(30),
            user_agent: format!("tollgate-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl Config {
    /// Create a new config with the given endpoint and client secret
    pub fn new(endpoint: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client_secret: client_secret.into(),
            ..Default::default()
        }
    }

    /// Send an `Origin` header with every request
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
