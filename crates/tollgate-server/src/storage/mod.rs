//! Storage abstraction for the tollgate server.
//!
//! Two capabilities live here, each behind a trait so backends can be
//! swapped without touching handlers:
//!
//! - [`IssuerStore`] owns issuer rows: signing keys grouped by
//!   `issuer_type`, their validity windows, and the rotation/retirement
//!   timestamps the rotation controller maintains.
//! - [`RedemptionLedger`] owns redemption rows: the durable record of
//!   `(issuer, preimage)` pairs that have been spent. The production
//!   ledger dispatches on the issuer's `version` between a partitioned
//!   relational backend (v1) and a key-value backend with conditional
//!   put (v2); see [`ledger::Ledger`].
//!
//! Handlers hold `Arc<dyn …>` references to both; no handler keeps a
//! long-lived reference to a row.

pub mod cached;
pub mod ledger;
pub mod memory;
pub mod postgres;
pub mod redis;

pub use cached::CachedIssuerStore;
pub use ledger::Ledger;
pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use redis::RedisLedger;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tollgate_voprf::SigningKey;
use uuid::Uuid;

/// Issuers created without an explicit capacity get this one.
pub const DEFAULT_MAX_TOKENS: i32 = 40;

/// Error type for storage operations.
///
/// The storage layer is responsible for classifying backend-native
/// errors (unique-violation codes, conditional-put misses) into the
/// duplicate kind; anything else surfaces as a backend error.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Issuer with the given name does not exist")]
    IssuerNotFound,

    #[error("Redemption with the given id does not exist")]
    RedemptionNotFound,

    #[error("Duplicate redemption")]
    DuplicateRedemption,

    #[error("Stored signing key is invalid: {0}")]
    InvalidKey(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// A versioned signing key record grouped under an `issuer_type`.
///
/// Lifecycle: `active → rotated → retired`. A rotated issuer has a live
/// successor of the same type; a retired issuer is excluded from every
/// lookup path. Legacy v1 issuers carry no expiry and sort last in the
/// active ordering.
#[derive(Clone)]
pub struct Issuer {
    pub id: Uuid,
    pub issuer_type: String,
    /// Parsed once at row read; signing keys are read-only once loaded
    /// and shared freely.
    pub signing_key: Arc<SigningKey>,
    pub max_tokens: i32,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub rotated_at: Option<DateTime<Utc>>,
    pub retired_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl Issuer {
    /// Whether redemptions for this issuer land in the key-value ledger.
    pub fn uses_kv_ledger(&self) -> bool {
        self.version == 2
    }
}

impl fmt::Debug for Issuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The signing key never appears in logs or debug output.
        f.debug_struct("Issuer")
            .field("id", &self.id)
            .field("issuer_type", &self.issuer_type)
            .field("max_tokens", &self.max_tokens)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("rotated_at", &self.rotated_at)
            .field("retired_at", &self.retired_at)
            .field("version", &self.version)
            .finish_non_exhaustive()
    }
}

/// A recorded redemption.
///
/// `id` is the text encoding of the token preimage. v2 records
/// additionally carry a TTL (the issuer's expiry as epoch seconds) so
/// the key-value backend may garbage-collect them once every plausible
/// redemption window has closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redemption {
    #[serde(rename = "issuerId")]
    pub issuer_id: Uuid,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<i64>,
}

/// Issuer persistence capability.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait IssuerStore: Send + Sync {
    /// All non-retired issuers of the given type, ordered
    /// `expires_at DESC NULLS LAST, created_at DESC`. The redeem path
    /// tries every returned key, newest first.
    ///
    /// Fails with [`StorageError::IssuerNotFound`] when the set is empty.
    async fn fetch_issuers(&self, issuer_type: &str) -> Result<Vec<Issuer>, StorageError>;

    /// The current signing key for a type: the head of [`fetch_issuers`]'
    /// ordering. Used by the issue path.
    ///
    /// [`fetch_issuers`]: IssuerStore::fetch_issuers
    async fn fetch_current(&self, issuer_type: &str) -> Result<Issuer, StorageError> {
        self.fetch_issuers(issuer_type)
            .await?
            .into_iter()
            .next()
            .ok_or(StorageError::IssuerNotFound)
    }

    /// Point lookup by id, excluding retired issuers. The audit-lookup
    /// path uses this to discover which ledger backend holds the
    /// corresponding redemption.
    async fn fetch_by_id(&self, id: Uuid) -> Result<Issuer, StorageError>;

    /// Insert one issuer with a fresh random signing key. A
    /// `max_tokens` of zero falls back to [`DEFAULT_MAX_TOKENS`].
    async fn create_issuer(
        &self,
        issuer_type: &str,
        max_tokens: i32,
        expires_at: Option<DateTime<Utc>>,
        version: i32,
    ) -> Result<Issuer, StorageError>;

    /// Stamp `rotated_at`, recording that a successor has been minted.
    async fn mark_rotated(&self, id: Uuid) -> Result<Issuer, StorageError>;

    /// Stamp `retired_at`, removing the key from the active set.
    async fn mark_retired(&self, id: Uuid) -> Result<Issuer, StorageError>;

    /// Rotation Phase A: mint successors for issuers whose expiry falls
    /// within the next `expiration_window_days`. Runs in a single
    /// transaction; rows already claimed by a concurrent tick are
    /// skipped. Returns the successors created.
    async fn rotate_issuers(
        &self,
        expiration_window_days: i64,
        renewal_window_days: i64,
    ) -> Result<Vec<Issuer>, StorageError>;

    /// Rotation Phase B: retire issuers whose validity has passed and
    /// that already have a successor, provisioning their relational
    /// ledger partition first. Returns the rows retired.
    async fn retire_issuers(&self) -> Result<Vec<Issuer>, StorageError>;
}

/// Redemption persistence capability.
#[async_trait]
pub trait RedemptionLedger: Send + Sync {
    /// Durably record `(issuer, id)` exactly once. A second call for
    /// the same pair returns [`StorageError::DuplicateRedemption`],
    /// regardless of backend, cache state, or concurrent callers.
    async fn record(&self, issuer: &Issuer, id: &str, payload: &str) -> Result<(), StorageError>;

    /// Point lookup of a recorded redemption.
    async fn fetch(&self, issuer: &Issuer, id: &str) -> Result<Redemption, StorageError>;
}
