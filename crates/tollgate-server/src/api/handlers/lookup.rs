//! Audit-lookup handler
//!
//! Point lookup of a recorded redemption. The issuer row is fetched
//! first to discover which ledger backend (relational v1 or key-value
//! v2) holds the record.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::storage::{Redemption, StorageError};

use super::AppState;

#[derive(Deserialize)]
pub struct RedemptionQuery {
    #[serde(rename = "tokenId")]
    pub token_id: String,
}

/// Return the recorded redemption for `(issuer, tokenId)`
///
/// GET /v1/blindedToken/{id}/redemption/?tokenId=…
pub async fn check_redemption(
    State(state): State<Arc<AppState>>,
    Path(issuer_id): Path<Uuid>,
    Query(query): Query<RedemptionQuery>,
) -> Result<Json<Redemption>, ApiError> {
    let issuer = state.issuers.fetch_by_id(issuer_id).await?;

    let redemption = state
        .ledger
        .fetch(&issuer, &query.token_id)
        .await
        .map_err(|e| match e {
            StorageError::RedemptionNotFound => ApiError::RedemptionNotFound,
            _ => ApiError::Internal("Could not check token redemption"),
        })?;

    Ok(Json(redemption))
}
