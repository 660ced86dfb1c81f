//! Issuer admin handlers
//!
//! Creation of issuers (the rotation controller mints the rest) and a
//! public view of the current key for a type. Only the public key is
//! ever exposed; the signing key never leaves the storage layer.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::storage::Issuer;

use super::AppState;

fn default_version() -> i32 {
    1
}

#[derive(Deserialize)]
pub struct CreateIssuerRequest {
    pub name: String,
    #[serde(default)]
    pub max_tokens: i32,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default = "default_version")]
    pub version: i32,
}

#[derive(Serialize)]
pub struct IssuerResponse {
    pub id: Uuid,
    pub name: String,
    pub public_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    pub version: i32,
}

impl IssuerResponse {
    fn from_issuer(issuer: &Issuer) -> Self {
        Self {
            id: issuer.id,
            name: issuer.issuer_type.clone(),
            public_key: issuer.signing_key.public_key.encode_base64(),
            expires_at: issuer.expires_at,
            version: issuer.version,
        }
    }
}

/// Create an issuer with a fresh signing key
///
/// POST /v1/issuer/
pub async fn create_issuer(
    State(state): State<Arc<AppState>>,
    body: Result<Json<CreateIssuerRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<IssuerResponse>), ApiError> {
    let Json(request) =
        body.map_err(|_| ApiError::BadRequest("Could not parse the request body".into()))?;

    if request.name.is_empty() {
        return Err(ApiError::BadRequest("Issuer name must not be empty".into()));
    }
    if !(1..=2).contains(&request.version) {
        return Err(ApiError::BadRequest("Issuer version must be 1 or 2".into()));
    }
    // Only legacy v1 issuers may live without an expiry.
    if request.version == 2 && request.expires_at.is_none() {
        return Err(ApiError::BadRequest("A v2 issuer requires an expiry".into()));
    }
    if request.expires_at.is_some_and(|at| at <= Utc::now()) {
        return Err(ApiError::BadRequest("expires_at must be in the future".into()));
    }
    if request.max_tokens < 0 {
        return Err(ApiError::BadRequest("max_tokens must not be negative".into()));
    }

    let max_tokens = if request.max_tokens == 0 {
        state.default_max_tokens
    } else {
        request.max_tokens
    };

    let issuer = state
        .issuers
        .create_issuer(&request.name, max_tokens, request.expires_at, request.version)
        .await?;

    info!(issuer_type = %issuer.issuer_type, id = %issuer.id, "Created issuer via admin API");

    Ok((StatusCode::CREATED, Json(IssuerResponse::from_issuer(&issuer))))
}

/// Public view of the current issuer for a type
///
/// GET /v1/issuer/{type}
pub async fn get_issuer(
    State(state): State<Arc<AppState>>,
    Path(issuer_type): Path<String>,
) -> Result<Json<IssuerResponse>, ApiError> {
    let issuer = state.issuers.fetch_current(&issuer_type).await?;
    Ok(Json(IssuerResponse::from_issuer(&issuer)))
}
