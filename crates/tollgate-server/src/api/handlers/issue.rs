//! Token issuance handler
//!
//! Signs a batch of blinded tokens under the current signing key for an
//! issuer type and returns the signed batch with its DLEQ proof. No
//! per-issuer quota is enforced at issuance; the request-size cap is
//! the only bound, and `max_tokens` is advisory metadata propagated to
//! successors during rotation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use tollgate_voprf::{approve_tokens, BatchDLEQProof, BlindedToken, SignedToken};

use crate::api::error::ApiError;
use crate::metrics::ServerMetrics;
use crate::storage::{IssuerStore, RedemptionLedger};

/// Application state shared across handlers
pub struct AppState {
    /// Issuer persistence, possibly cache-wrapped
    pub issuers: Arc<dyn IssuerStore>,
    /// Redemption ledger (dual backend in production)
    pub ledger: Arc<dyn RedemptionLedger>,
    /// Prometheus counters
    pub metrics: ServerMetrics,
    /// Admission tokens; `None` disables enforcement
    pub admission_tokens: Option<Vec<String>>,
    /// Default capacity for issuers created without an explicit one
    pub default_max_tokens: i32,
}

#[derive(Deserialize)]
pub struct BlindedTokenIssueRequest {
    pub blinded_tokens: Vec<BlindedToken>,
}

#[derive(Serialize)]
pub struct BlindedTokenIssueResponse {
    pub batch_proof: BatchDLEQProof,
    pub signed_tokens: Vec<SignedToken>,
}

/// Issue signed tokens for a batch of blinded tokens
///
/// POST /v1/blindedToken/{type}
pub async fn issue_tokens(
    State(state): State<Arc<AppState>>,
    Path(issuer_type): Path<String>,
    body: Result<Json<BlindedTokenIssueRequest>, JsonRejection>,
) -> Result<Json<BlindedTokenIssueResponse>, ApiError> {
    let issuer = state.issuers.fetch_current(&issuer_type).await?;

    let Json(request) =
        body.map_err(|_| ApiError::BadRequest("Could not parse the request body".into()))?;

    if request.blinded_tokens.is_empty() {
        return Err(ApiError::BadRequest("Empty request".into()));
    }

    let (signed_tokens, batch_proof) = approve_tokens(&request.blinded_tokens, &issuer.signing_key)
        .map_err(|_| ApiError::Internal("Could not approve new tokens"))?;

    state
        .metrics
        .record_issuance(&issuer_type, signed_tokens.len() as u64);
    info!(
        issuer_type = %issuer_type,
        issuer = %issuer.id,
        count = signed_tokens.len(),
        "Issued signed tokens"
    );

    Ok(Json(BlindedTokenIssueResponse {
        batch_proof,
        signed_tokens,
    }))
}
