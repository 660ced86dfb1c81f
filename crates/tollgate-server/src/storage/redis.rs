//! Key-value redemption ledger (v2 issuers)
//!
//! Each redemption is one key, `redemption:{issuer_id}:{id}`, holding
//! the JSON record. The write is a conditional put (`SET … NX`): if the
//! key already exists the put is refused and the redemption is a
//! duplicate. The key expires at the issuer's `expires_at` (`EXAT`), so
//! the backend garbage-collects entries once every plausible redemption
//! window has closed.
//!
//! # Environment Variables
//!
//! - `REDIS_URL`: connection string, e.g. `redis://127.0.0.1:6379`

use async_trait::async_trait;
use chrono::Utc;
use redis::aio::ConnectionManager;
use tracing::{error, info};
use uuid::Uuid;

use super::{Issuer, Redemption, RedemptionLedger, StorageError};

/// Redis-backed v2 redemption ledger.
#[derive(Clone)]
pub struct RedisLedger {
    conn: ConnectionManager,
}

impl RedisLedger {
    /// Connect to the key-value backend.
    pub async fn new(redis_url: &str) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        info!("Connected to Redis");
        Ok(Self { conn })
    }

    fn key(issuer_id: Uuid, id: &str) -> String {
        format!("redemption:{}:{}", issuer_id, id)
    }
}

#[async_trait]
impl RedemptionLedger for RedisLedger {
    async fn record(&self, issuer: &Issuer, id: &str, payload: &str) -> Result<(), StorageError> {
        let ttl = issuer.expires_at.map(|at| at.timestamp());
        let redemption = Redemption {
            issuer_id: issuer.id,
            id: id.to_string(),
            timestamp: Utc::now(),
            payload: payload.to_string(),
            ttl,
        };

        let value = serde_json::to_string(&redemption)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut cmd = redis::cmd("SET");
        cmd.arg(Self::key(issuer.id, id)).arg(value).arg("NX");
        if let Some(expire_at) = ttl {
            cmd.arg("EXAT").arg(expire_at);
        }

        let mut conn = self.conn.clone();
        let reply: Option<String> = cmd.query_async(&mut conn).await.map_err(|e| {
            error!(issuer = %issuer.id, error = %e, "Failed to record redemption");
            StorageError::Backend(e.to_string())
        })?;

        // NX: a nil reply means the key was already present.
        match reply {
            Some(_) => Ok(()),
            None => Err(StorageError::DuplicateRedemption),
        }
    }

    async fn fetch(&self, issuer: &Issuer, id: &str) -> Result<Redemption, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = redis::cmd("GET")
            .arg(Self::key(issuer.id, id))
            .query_async(&mut conn)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match value {
            Some(json) => {
                serde_json::from_str(&json).map_err(|e| StorageError::Backend(e.to_string()))
            }
            None => Err(StorageError::RedemptionNotFound),
        }
    }
}
