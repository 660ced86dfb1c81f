//! Token redemption handler
//!
//! A token may have been signed by any currently-valid key for its
//! issuer type, so the handler walks every non-retired issuer of the
//! type, newest first; most redemptions are for recently issued
//! tokens, so the walk usually stops at the head. The verified issuer's
//! version selects the ledger backend that records the spend.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;

use tollgate_voprf::{verify_token_redemption, TokenPreimage, VerificationSignature};

use crate::api::error::ApiError;
use crate::metrics::{OUTCOME_DUPLICATE, OUTCOME_OK, OUTCOME_UNVERIFIED};
use crate::storage::StorageError;

use super::AppState;

#[derive(Deserialize)]
pub struct BlindedTokenRedeemRequest {
    pub t: TokenPreimage,
    pub signature: VerificationSignature,
    #[serde(default)]
    pub payload: String,
}

/// Redeem a token, recording it against double-spend
///
/// POST /v1/blindedToken/{type}/redemption/
pub async fn redeem_token(
    State(state): State<Arc<AppState>>,
    Path(issuer_type): Path<String>,
    body: Result<Json<BlindedTokenRedeemRequest>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let issuers = state.issuers.fetch_issuers(&issuer_type).await?;

    let Json(request) =
        body.map_err(|_| ApiError::BadRequest("Could not parse the request body".into()))?;

    let verified_issuer = issuers.iter().find(|issuer| {
        verify_token_redemption(
            &request.t,
            &request.signature,
            request.payload.as_bytes(),
            &[issuer.signing_key.as_ref()],
        )
        .is_ok()
    });

    let Some(issuer) = verified_issuer else {
        state
            .metrics
            .record_redemption(&issuer_type, OUTCOME_UNVERIFIED);
        return Err(ApiError::Unverified);
    };

    let preimage = request.t.encode_base64();
    match state.ledger.record(issuer, &preimage, &request.payload).await {
        Ok(()) => {
            state.metrics.record_redemption(&issuer_type, OUTCOME_OK);
            info!(issuer_type = %issuer_type, issuer = %issuer.id, "Recorded redemption");
            Ok(StatusCode::OK)
        }
        Err(StorageError::DuplicateRedemption) => {
            state
                .metrics
                .record_redemption(&issuer_type, OUTCOME_DUPLICATE);
            Err(ApiError::DuplicateRedemption)
        }
        Err(_) => Err(ApiError::Internal("Could not mark token redemption")),
    }
}
