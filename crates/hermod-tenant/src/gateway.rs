//! Tenant config cache and per-tenant DMS pool lifecycle.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use hermod_core::{
    storage, CoreError, Result, TenantConfig, TenantConfigSource, TenantDirectory, TenantId,
};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::RwLock;
use tracing::{error, info};

/// Maximum connections per tenant DMS pool.
const TENANT_POOL_MAX_CONNECTIONS: u32 = 15;

/// Idle timeout shared by all tenant pools.
const TENANT_POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(600);

/// Gateway to the multi-tenant data layer.
///
/// Both caches are read-mostly: entries are built once and published
/// atomically behind the lock, so concurrent readers never observe a
/// half-initialised config or pool. Neither cache expires; credential
/// rotation requires a process restart.
pub struct TenantGateway {
    tenants: Arc<storage::tenants::Repository>,
    configs: RwLock<HashMap<TenantId, Arc<TenantConfig>>>,
    pools: RwLock<HashMap<TenantId, PgPool>>,
}

impl TenantGateway {
    /// Creates a gateway over the central tenant repository.
    pub fn new(tenants: Arc<storage::tenants::Repository>) -> Self {
        Self { tenants, configs: RwLock::new(HashMap::new()), pools: RwLock::new(HashMap::new()) }
    }

    /// The tenant's configuration, cached after the first load.
    pub async fn config(&self, tenant: &TenantId) -> Result<Arc<TenantConfig>> {
        if let Some(config) = self.configs.read().await.get(tenant) {
            return Ok(config.clone());
        }

        let loaded = self
            .tenants
            .find(tenant)
            .await?
            .ok_or_else(|| {
                CoreError::configuration(format!("missing tenant config for tenant {tenant}"))
            })
            .map(Arc::new)?;

        let mut configs = self.configs.write().await;
        // Another caller may have loaded the same tenant while we queried.
        let config = configs.entry(tenant.clone()).or_insert(loaded).clone();
        Ok(config)
    }

    /// The tenant's DMS pool, created lazily from its connection string.
    pub async fn pool(&self, tenant: &TenantId) -> Result<PgPool> {
        if let Some(pool) = self.pools.read().await.get(tenant) {
            return Ok(pool.clone());
        }

        let config = self.config(tenant).await?;
        let conninfo = config
            .dms_connection_string
            .as_deref()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                CoreError::configuration(format!(
                    "tenant {tenant} does not expose a DMS connection string"
                ))
            })?;

        let built = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(TENANT_POOL_MAX_CONNECTIONS)
            .idle_timeout(TENANT_POOL_IDLE_TIMEOUT)
            .connect_lazy(conninfo)
            .map_err(|e| {
                CoreError::configuration(format!("invalid DMS connection string for {tenant}: {e}"))
            })?;

        let mut pools = self.pools.write().await;
        let pool = pools
            .entry(tenant.clone())
            .or_insert_with(|| {
                info!(tenant_id = %tenant, "opened tenant DMS pool");
                built
            })
            .clone();
        Ok(pool)
    }

    /// Closes every tenant pool. Called once during graceful shutdown.
    pub async fn close_pools(&self) {
        let mut pools = self.pools.write().await;
        for (tenant, pool) in pools.drain() {
            pool.close().await;
            info!(tenant_id = %tenant, "closed tenant DMS pool");
        }
    }
}

#[async_trait]
impl TenantConfigSource for TenantGateway {
    async fn config(&self, tenant: &TenantId) -> Result<Arc<TenantConfig>> {
        TenantGateway::config(self, tenant).await
    }
}

#[async_trait]
impl TenantDirectory for TenantGateway {
    async fn list_tenants(&self) -> Result<Vec<TenantId>> {
        self.tenants.list_ids().await.map_err(|e| {
            error!(error = %e, "failed to list tenants");
            e
        })
    }
}
