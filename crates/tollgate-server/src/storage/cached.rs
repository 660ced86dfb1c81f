//! Issuer cache wrapper
//!
//! [`CachedIssuerStore`] wraps any [`IssuerStore`] and adds TTL'd
//! in-memory caches: list results keyed by `issuer_type`, point results
//! keyed by issuer id. Every mutating call invalidates the entries for
//! the affected type and id; the bulk rotation phases return the rows
//! they touched so invalidation stays precise.
//!
//! The cache is best-effort. A stale list can only over-approximate the
//! active set, including a predecessor that is still valid until its
//! retirement lands. An extra candidate key can only fail
//! verification, never produce a false accept.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use uuid::Uuid;

use super::{Issuer, IssuerStore, StorageError};

/// TTL'd read cache over an issuer store.
pub struct CachedIssuerStore<S> {
    inner: S,
    by_type: Cache<String, Arc<Vec<Issuer>>>,
    by_id: Cache<Uuid, Issuer>,
}

impl<S: IssuerStore> CachedIssuerStore<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            by_type: Cache::builder().time_to_live(ttl).build(),
            by_id: Cache::builder().time_to_live(ttl).build(),
        }
    }

    async fn invalidate(&self, issuer: &Issuer) {
        self.by_type.invalidate(&issuer.issuer_type).await;
        self.by_id.invalidate(&issuer.id).await;
    }
}

#[async_trait]
impl<S: IssuerStore> IssuerStore for CachedIssuerStore<S> {
    async fn fetch_issuers(&self, issuer_type: &str) -> Result<Vec<Issuer>, StorageError> {
        if let Some(cached) = self.by_type.get(issuer_type).await {
            return Ok((*cached).clone());
        }

        let issuers = self.inner.fetch_issuers(issuer_type).await?;
        self.by_type
            .insert(issuer_type.to_string(), Arc::new(issuers.clone()))
            .await;
        Ok(issuers)
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Issuer, StorageError> {
        if let Some(issuer) = self.by_id.get(&id).await {
            return Ok(issuer);
        }

        let issuer = self.inner.fetch_by_id(id).await?;
        self.by_id.insert(id, issuer.clone()).await;
        Ok(issuer)
    }

    async fn create_issuer(
        &self,
        issuer_type: &str,
        max_tokens: i32,
        expires_at: Option<DateTime<Utc>>,
        version: i32,
    ) -> Result<Issuer, StorageError> {
        let issuer = self
            .inner
            .create_issuer(issuer_type, max_tokens, expires_at, version)
            .await?;
        self.invalidate(&issuer).await;
        Ok(issuer)
    }

    async fn mark_rotated(&self, id: Uuid) -> Result<Issuer, StorageError> {
        let issuer = self.inner.mark_rotated(id).await?;
        self.invalidate(&issuer).await;
        Ok(issuer)
    }

    async fn mark_retired(&self, id: Uuid) -> Result<Issuer, StorageError> {
        let issuer = self.inner.mark_retired(id).await?;
        self.invalidate(&issuer).await;
        Ok(issuer)
    }

    async fn rotate_issuers(
        &self,
        expiration_window_days: i64,
        renewal_window_days: i64,
    ) -> Result<Vec<Issuer>, StorageError> {
        let successors = self
            .inner
            .rotate_issuers(expiration_window_days, renewal_window_days)
            .await?;
        for issuer in &successors {
            self.invalidate(issuer).await;
        }
        Ok(successors)
    }

    async fn retire_issuers(&self) -> Result<Vec<Issuer>, StorageError> {
        let retired = self.inner.retire_issuers().await?;
        for issuer in &retired {
            self.invalidate(issuer).await;
        }
        Ok(retired)
    }
}
