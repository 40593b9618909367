//! Tenant records and the registry interface the gateway consumes

use crate::cors::normalize_host;
use crate::error::{RegistryError, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::time::Duration;

/// Service level of a tenant
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Premium,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Premium => "premium",
        }
    }
}

/// A registered API consumer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    /// Normalized host: lowercase, no leading `www.`
    pub host: String,
    pub secret: String,
    #[serde(default)]
    pub tier: Tier,
    /// User who registered the tenant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
}

impl Tenant {
    pub fn new(
        id: impl Into<String>,
        host: impl AsRef<str>,
        secret: impl Into<String>,
        tier: Tier,
    ) -> Self {
        Self {
            id: id.into(),
            host: normalize_host(host.as_ref()),
            secret: secret.into(),
            tier,
            owner_id: None,
        }
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }
}

/// Lookup capability over the persistent tenant store
#[async_trait]
pub trait TenantRegistry: Send + Sync {
    /// Find the tenant that owns a client secret
    async fn find_by_secret(&self, secret: &str) -> Result<Option<Tenant>>;

    /// Find the tenant registered for a normalized host
    async fn find_by_host(&self, host: &str) -> Result<Option<Tenant>>;

    /// Find a tenant by id
    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>>;
}

/// Run a registry lookup, failing with `RegistryError::Timeout` past `limit`
pub async fn with_timeout<T, F>(limit: Duration, lookup: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, lookup).await {
        Ok(result) => result,
        Err(_) => Err(RegistryError::Timeout {
            millis: limit.as_millis() as u64,
        }),
    }
}

/// An in-memory tenant registry
///
/// Tenants are indexed by id, secret and host. Insertion enforces the
/// one-tenant-per-host and one-tenant-per-secret invariants.
#[derive(Debug, Default)]
pub struct MemoryTenantRegistry {
    tenants: DashMap<String, Tenant>,
    by_secret: DashMap<String, String>,
    by_host: DashMap<String, String>,
}

impl MemoryTenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of records
    pub fn from_tenants(tenants: impl IntoIterator<Item = Tenant>) -> Result<Self> {
        let registry = Self::new();
        for tenant in tenants {
            registry.insert(tenant)?;
        }
        Ok(registry)
    }

    /// Load tenant records from a JSON array file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .map_err(|e| RegistryError::Unavailable(e.to_string()))?;
        let tenants: Vec<Tenant> =
            serde_json::from_str(&raw).map_err(|e| RegistryError::InvalidRecord(e.to_string()))?;
        Self::from_tenants(tenants)
    }

    /// Register a tenant
    pub fn insert(&self, mut tenant: Tenant) -> Result<()> {
        tenant.host = normalize_host(&tenant.host);

        match self.by_host.entry(tenant.host.clone()) {
            Entry::Occupied(_) => return Err(RegistryError::DuplicateHost(tenant.host)),
            Entry::Vacant(slot) => {
                slot.insert(tenant.id.clone());
            }
        }

        match self.by_secret.entry(tenant.secret.clone()) {
            Entry::Occupied(_) => {
                self.by_host.remove(&tenant.host);
                return Err(RegistryError::DuplicateSecret);
            }
            Entry::Vacant(slot) => {
                slot.insert(tenant.id.clone());
            }
        }

        self.tenants.insert(tenant.id.clone(), tenant);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }

    fn resolve(&self, id: Option<String>) -> Option<Tenant> {
        id.and_then(|id| self.tenants.get(&id).map(|t| t.value().clone()))
    }
}

#[async_trait]
impl TenantRegistry for MemoryTenantRegistry {
    async fn find_by_secret(&self, secret: &str) -> Result<Option<Tenant>> {
        Ok(self.resolve(self.by_secret.get(secret).map(|id| id.value().clone())))
    }

    async fn find_by_host(&self, host: &str) -> Result<Option<Tenant>> {
        let host = normalize_host(host);
        Ok(self.resolve(self.by_host.get(&host).map(|id| id.value().clone())))
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Tenant>> {
        Ok(self.tenants.get(id).map(|t| t.value().clone()))
    }
}
