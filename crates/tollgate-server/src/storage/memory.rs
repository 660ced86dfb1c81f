//! In-memory storage backend
//!
//! Implements both capabilities over locked maps. Suitable for
//! development and single-instance runs without Postgres/Redis; the
//! test suites run against it because it honors the same ordering,
//! duplicate-detection, and rotation semantics as the production
//! backends. Data is lost on restart.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

use super::{
    Issuer, IssuerStore, Redemption, RedemptionLedger, StorageError, DEFAULT_MAX_TOKENS,
};

/// In-memory issuer store and redemption ledger.
#[derive(Default)]
pub struct MemoryStore {
    issuers: RwLock<HashMap<Uuid, Issuer>>,
    redemptions: Mutex<HashMap<(Uuid, String), Redemption>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `expires_at DESC NULLS LAST, created_at DESC`.
fn active_order(a: &Issuer, b: &Issuer) -> Ordering {
    match (a.expires_at, b.expires_at) {
        (Some(x), Some(y)) => y.cmp(&x),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
    .then_with(|| b.created_at.cmp(&a.created_at))
}

#[async_trait]
impl IssuerStore for MemoryStore {
    async fn fetch_issuers(&self, issuer_type: &str) -> Result<Vec<Issuer>, StorageError> {
        let issuers = self.issuers.read().unwrap();
        let mut matching: Vec<Issuer> = issuers
            .values()
            .filter(|i| i.issuer_type == issuer_type && i.retired_at.is_none())
            .cloned()
            .collect();

        if matching.is_empty() {
            return Err(StorageError::IssuerNotFound);
        }

        matching.sort_by(active_order);
        Ok(matching)
    }

    async fn fetch_by_id(&self, id: Uuid) -> Result<Issuer, StorageError> {
        let issuers = self.issuers.read().unwrap();
        issuers
            .get(&id)
            .filter(|i| i.retired_at.is_none())
            .cloned()
            .ok_or(StorageError::IssuerNotFound)
    }

    async fn create_issuer(
        &self,
        issuer_type: &str,
        max_tokens: i32,
        expires_at: Option<DateTime<Utc>>,
        version: i32,
    ) -> Result<Issuer, StorageError> {
        let issuer = Issuer {
            id: Uuid::new_v4(),
            issuer_type: issuer_type.to_string(),
            signing_key: Arc::new(tollgate_voprf::random_signing_key()),
            max_tokens: if max_tokens == 0 { DEFAULT_MAX_TOKENS } else { max_tokens },
            created_at: Utc::now(),
            expires_at,
            rotated_at: None,
            retired_at: None,
            version,
        };

        let mut issuers = self.issuers.write().unwrap();
        issuers.insert(issuer.id, issuer.clone());
        Ok(issuer)
    }

    async fn mark_rotated(&self, id: Uuid) -> Result<Issuer, StorageError> {
        let mut issuers = self.issuers.write().unwrap();
        let issuer = issuers.get_mut(&id).ok_or(StorageError::IssuerNotFound)?;
        issuer.rotated_at = Some(Utc::now());
        Ok(issuer.clone())
    }

    async fn mark_retired(&self, id: Uuid) -> Result<Issuer, StorageError> {
        let mut issuers = self.issuers.write().unwrap();
        let issuer = issuers.get_mut(&id).ok_or(StorageError::IssuerNotFound)?;
        issuer.retired_at = Some(Utc::now());
        Ok(issuer.clone())
    }

    async fn rotate_issuers(
        &self,
        expiration_window_days: i64,
        renewal_window_days: i64,
    ) -> Result<Vec<Issuer>, StorageError> {
        let now = Utc::now();
        let horizon = now + Duration::days(expiration_window_days);

        let mut issuers = self.issuers.write().unwrap();
        let due: Vec<Uuid> = issuers
            .values()
            .filter(|i| {
                i.rotated_at.is_none()
                    && i.expires_at.is_some_and(|at| at > now && at < horizon)
            })
            .map(|i| i.id)
            .collect();

        let mut successors = Vec::with_capacity(due.len());
        for id in due {
            let (issuer_type, max_tokens, expires_at) = {
                let predecessor = issuers.get_mut(&id).expect("row selected above");
                predecessor.rotated_at = Some(now);
                (
                    predecessor.issuer_type.clone(),
                    predecessor.max_tokens,
                    predecessor.expires_at,
                )
            };

            let successor = Issuer {
                id: Uuid::new_v4(),
                issuer_type,
                signing_key: Arc::new(tollgate_voprf::random_signing_key()),
                max_tokens,
                created_at: now,
                expires_at: expires_at.map(|at| at + Duration::days(renewal_window_days)),
                rotated_at: None,
                retired_at: None,
                version: 2,
            };
            issuers.insert(successor.id, successor.clone());
            successors.push(successor);
        }

        Ok(successors)
    }

    async fn retire_issuers(&self) -> Result<Vec<Issuer>, StorageError> {
        let now = Utc::now();

        let mut issuers = self.issuers.write().unwrap();
        let mut retired = Vec::new();
        for issuer in issuers.values_mut() {
            if issuer.retired_at.is_none()
                && issuer.rotated_at.is_some()
                && issuer.expires_at.is_some_and(|at| at <= now)
            {
                issuer.retired_at = Some(now);
                retired.push(issuer.clone());
            }
        }

        Ok(retired)
    }
}

#[async_trait]
impl RedemptionLedger for MemoryStore {
    async fn record(&self, issuer: &Issuer, id: &str, payload: &str) -> Result<(), StorageError> {
        let mut redemptions = self.redemptions.lock().unwrap();
        let key = (issuer.id, id.to_string());
        if redemptions.contains_key(&key) {
            return Err(StorageError::DuplicateRedemption);
        }

        let ttl = if issuer.uses_kv_ledger() {
            issuer.expires_at.map(|at| at.timestamp())
        } else {
            None
        };
        redemptions.insert(
            key,
            Redemption {
                issuer_id: issuer.id,
                id: id.to_string(),
                timestamp: Utc::now(),
                payload: payload.to_string(),
                ttl,
            },
        );
        Ok(())
    }

    async fn fetch(&self, issuer: &Issuer, id: &str) -> Result<Redemption, StorageError> {
        let redemptions = self.redemptions.lock().unwrap();
        redemptions
            .get(&(issuer.id, id.to_string()))
            .cloned()
            .ok_or(StorageError::RedemptionNotFound)
    }
}
