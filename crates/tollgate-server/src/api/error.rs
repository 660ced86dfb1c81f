//! API error types and responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::storage::StorageError;

/// API error type
///
/// Handlers translate storage and crypto error kinds into these; the
/// response body carries only the human-readable message, never
/// internal error detail.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Issuer with the given name does not exist")]
    IssuerNotFound,

    #[error("Redemption with the given id does not exist")]
    RedemptionNotFound,

    #[error("Could not verify that token redemption is valid")]
    Unverified,

    #[error("Duplicate redemption")]
    DuplicateRedemption,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("{0}")]
    Internal(&'static str),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::BadRequest(_)
            | ApiError::IssuerNotFound
            | ApiError::RedemptionNotFound
            | ApiError::Unverified => StatusCode::BAD_REQUEST,
            ApiError::DuplicateRedemption => StatusCode::CONFLICT,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = ErrorResponse {
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::IssuerNotFound => ApiError::IssuerNotFound,
            StorageError::RedemptionNotFound => ApiError::RedemptionNotFound,
            StorageError::DuplicateRedemption => ApiError::DuplicateRedemption,
            // Backend detail is logged where it happens, never echoed.
            StorageError::InvalidKey(_)
            | StorageError::Backend(_)
            | StorageError::Connection(_) => ApiError::Internal("Internal server error"),
        }
    }
}
