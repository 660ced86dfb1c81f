//! Dual-backend redemption ledger
//!
//! [`Ledger`] composes the relational (v1) and key-value (v2) backends
//! behind the single [`RedemptionLedger`] capability. Dispatch is purely
//! on `issuer.version`; new backends can be added without touching
//! handlers.
//!
//! Point lookups go through an optional write-through read cache keyed
//! `"{issuer_id}:{id}"`. Redemptions are immutable once recorded, so a
//! cached hit can never go stale; only absence is re-checked against the
//! backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache;

use super::{Issuer, Redemption, RedemptionLedger, StorageError};

/// Redemption ledger dispatching on issuer version.
pub struct Ledger {
    relational: Arc<dyn RedemptionLedger>,
    kv: Arc<dyn RedemptionLedger>,
    cache: Option<Cache<String, Redemption>>,
}

impl Ledger {
    pub fn new(relational: Arc<dyn RedemptionLedger>, kv: Arc<dyn RedemptionLedger>) -> Self {
        Self { relational, kv, cache: None }
    }

    /// Enable the read cache with the given TTL.
    pub fn with_cache(mut self, ttl: Duration) -> Self {
        self.cache = Some(Cache::builder().time_to_live(ttl).build());
        self
    }

    fn backend_for(&self, issuer: &Issuer) -> &Arc<dyn RedemptionLedger> {
        if issuer.uses_kv_ledger() {
            &self.kv
        } else {
            &self.relational
        }
    }

    fn cache_key(issuer: &Issuer, id: &str) -> String {
        format!("{}:{}", issuer.id, id)
    }
}

#[async_trait]
impl RedemptionLedger for Ledger {
    async fn record(&self, issuer: &Issuer, id: &str, payload: &str) -> Result<(), StorageError> {
        self.backend_for(issuer).record(issuer, id, payload).await
    }

    async fn fetch(&self, issuer: &Issuer, id: &str) -> Result<Redemption, StorageError> {
        if let Some(cache) = &self.cache {
            if let Some(redemption) = cache.get(&Self::cache_key(issuer, id)).await {
                return Ok(redemption);
            }
        }

        let redemption = self.backend_for(issuer).fetch(issuer, id).await?;

        if let Some(cache) = &self.cache {
            cache
                .insert(Self::cache_key(issuer, id), redemption.clone())
                .await;
        }

        Ok(redemption)
    }
}
