use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;
use tracing::debug;

use super::{DirectoryError, Identity, IdentityDirectory};
use crate::config::IdentityConfig;

/// Read-through cache in front of another directory. Misses are never cached,
/// so a freshly registered identity is visible on its first request.
pub struct CachingDirectory {
    inner: Arc<dyn IdentityDirectory>,
    by_identity_key: Cache<String, Identity>,
    by_storage_key: Cache<String, Identity>,
}

impl CachingDirectory {
    pub fn new(inner: Arc<dyn IdentityDirectory>, config: &IdentityConfig) -> Self {
        let build = || {
            Cache::builder()
                .max_capacity(config.cache_capacity)
                .time_to_live(Duration::from_secs(config.cache_ttl_seconds))
                .build()
        };
        Self {
            inner,
            by_identity_key: build(),
            by_storage_key: build(),
        }
    }

    async fn remember(&self, identity: &Identity) {
        self.by_identity_key
            .insert(identity.identity_key.clone(), identity.clone())
            .await;
        self.by_storage_key
            .insert(identity.storage_key.clone(), identity.clone())
            .await;
    }

    /// Drop any cached entry for this identity, e.g. after its address changed.
    pub async fn invalidate(&self, identity_key: &str) {
        if let Some(identity) = self.by_identity_key.remove(identity_key).await {
            self.by_storage_key.invalidate(&identity.storage_key).await;
        }
    }
}

#[async_trait]
impl IdentityDirectory for CachingDirectory {
    async fn resolve(&self, identity_key: &str) -> Result<Option<Identity>, DirectoryError> {
        if let Some(identity) = self.by_identity_key.get(identity_key).await {
            debug!(identity_key, "Identity cache hit");
            return Ok(Some(identity));
        }
        let resolved = self.inner.resolve(identity_key).await?;
        if let Some(identity) = &resolved {
            self.remember(identity).await;
        }
        Ok(resolved)
    }

    async fn lookup(&self, storage_key: &str) -> Result<Option<Identity>, DirectoryError> {
        if let Some(identity) = self.by_storage_key.get(storage_key).await {
            return Ok(Some(identity));
        }
        let found = self.inner.lookup(storage_key).await?;
        if let Some(identity) = &found {
            self.remember(identity).await;
        }
        Ok(found)
    }
}
