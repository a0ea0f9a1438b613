//! Bundle sources: how the engine obtains a tenant's active bundle.
//!
//! Freshness and caching belong to the source. The reference sources here
//! hold bundles in memory and can be swapped at runtime.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::{BundleError, PolicyBundle};

/// Supplies the active bundle for a tenant. Must be safe to call concurrently.
#[async_trait]
pub trait BundleSource: Send + Sync {
    /// Active bundle for `client_id` (`None` for requests without a tenant).
    async fn active_bundle(&self, client_id: Option<&str>)
        -> Result<Arc<PolicyBundle>, BundleError>;
}

/// One bundle for every tenant.
pub struct StaticBundleSource {
    bundle: RwLock<Arc<PolicyBundle>>,
}

impl StaticBundleSource {
    /// Serve `bundle` to every caller.
    pub fn new(bundle: PolicyBundle) -> Self {
        Self {
            bundle: RwLock::new(Arc::new(bundle)),
        }
    }

    /// Swap in a new bundle. In-flight evaluations keep the one they fetched.
    pub async fn replace(&self, bundle: PolicyBundle) {
        info!(bundle = %bundle.id, version = bundle.version, "policy bundle replaced");
        *self.bundle.write().await = Arc::new(bundle);
    }
}

#[async_trait]
impl BundleSource for StaticBundleSource {
    async fn active_bundle(
        &self,
        _client_id: Option<&str>,
    ) -> Result<Arc<PolicyBundle>, BundleError> {
        Ok(Arc::clone(&*self.bundle.read().await))
    }
}

/// Bundles keyed by tenant, with an optional fallback.
pub struct TenantBundleSource {
    tenants: RwLock<HashMap<String, Arc<PolicyBundle>>>,
    default: Option<Arc<PolicyBundle>>,
}

impl TenantBundleSource {
    /// Source with no fallback: unknown tenants fail closed.
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            default: None,
        }
    }

    /// Source serving `bundle` to tenants without their own.
    pub fn with_default(bundle: PolicyBundle) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            default: Some(Arc::new(bundle)),
        }
    }

    /// Register or replace the bundle for `client_id`.
    pub async fn insert(&self, client_id: impl Into<String>, bundle: PolicyBundle) {
        let client_id = client_id.into();
        info!(tenant = %client_id, bundle = %bundle.id, version = bundle.version, "tenant bundle registered");
        self.tenants
            .write()
            .await
            .insert(client_id, Arc::new(bundle));
    }

    /// Remove a tenant's bundle. Returns whether one was present.
    pub async fn remove(&self, client_id: &str) -> bool {
        self.tenants.write().await.remove(client_id).is_some()
    }
}

impl Default for TenantBundleSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BundleSource for TenantBundleSource {
    async fn active_bundle(
        &self,
        client_id: Option<&str>,
    ) -> Result<Arc<PolicyBundle>, BundleError> {
        if let Some(id) = client_id {
            if let Some(bundle) = self.tenants.read().await.get(id) {
                return Ok(Arc::clone(bundle));
            }
        }
        self.default.clone().ok_or_else(|| {
            BundleError::UnknownTenant(client_id.unwrap_or("<none>").to_owned())
        })
    }
}

/// Stands in for a bundle that could not be loaded. Every fetch fails, so
/// every request is denied with `POLICY_UNAVAILABLE` and still audited.
pub struct UnavailableBundleSource {
    reason: String,
}

impl UnavailableBundleSource {
    /// Source failing with `reason`.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl BundleSource for UnavailableBundleSource {
    async fn active_bundle(
        &self,
        _client_id: Option<&str>,
    ) -> Result<Arc<PolicyBundle>, BundleError> {
        Err(BundleError::Unavailable(self.reason.clone()))
    }
}
