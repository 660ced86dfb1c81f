//! Tollgate Server
//!
//! The server side of an anonymous-token issuance and redemption
//! protocol over the Ristretto group. Clients blind tokens, the server
//! signs them under a per-issuer secret key, and clients later redeem
//! individual tokens; the server verifies each redemption and records
//! it so a token can never be spent twice, while a redeemed token stays
//! uncorrelatable with its issuance.
//!
//! ## Moving parts
//!
//! - **Issuer store**: issuer rows (type, signing key, version,
//!   validity window, rotation/retirement timestamps) with optional
//!   TTL'd caching.
//! - **Redemption ledger**: durable `(issuer, preimage)` records with
//!   duplicate detection; a partitioned relational backend for v1
//!   issuers and a key-value backend with conditional put for v2.
//! - **Rotation controller**: periodic task minting successors for
//!   issuers nearing expiry and retiring issuers whose validity has
//!   passed.
//!
//! ## API Endpoints
//!
//! - `GET /` - Heartbeat
//! - `GET /metrics` - Prometheus text exposition
//! - `POST /v1/blindedToken/{type}` - Sign a batch of blinded tokens
//! - `POST /v1/blindedToken/{type}/redemption/` - Redeem a token
//! - `GET /v1/blindedToken/{id}/redemption/?tokenId=…` - Audit lookup
//! - `POST /v1/issuer/` - Create an issuer (admin)
//! - `GET /v1/issuer/{type}` - Current public key for a type

pub mod api;
pub mod config;
pub mod metrics;
pub mod rotation;
pub mod storage;

pub use api::create_router;
pub use api::handlers::AppState;
pub use config::{CachingConfig, DbConfig, ServerConfig};
pub use metrics::ServerMetrics;
pub use rotation::RotationController;
pub use storage::{
    CachedIssuerStore, Issuer, IssuerStore, Ledger, MemoryStore, PostgresStore, Redemption,
    RedemptionLedger, RedisLedger, StorageError,
};
