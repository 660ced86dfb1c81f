//! Bearer-token admission middleware.
//!
//! In production every token and issuer endpoint requires one of the
//! opaque bearer tokens from `TOKEN_LIST` (comma-separated). Outside
//! production (`ENV` unset or not `production`) the middleware passes
//! everything through, which keeps local development and the test
//! suites unauthenticated.

use std::env;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::error::ApiError;
use super::handlers::AppState;

/// Admission tokens for this process, or `None` when enforcement is off.
pub fn admission_tokens_from_env() -> Option<Vec<String>> {
    if env::var("ENV").as_deref() != Ok("production") {
        return None;
    }

    let tokens = env::var("TOKEN_LIST").unwrap_or_default();
    Some(
        tokens
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

/// Reject requests without a recognised `Authorization: Bearer …` header.
pub async fn require_bearer(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(allowed) = &state.admission_tokens else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .is_some_and(|token| allowed.iter().any(|candidate| candidate == token));

    if authorized {
        next.run(request).await
    } else {
        ApiError::Unauthorized.into_response()
    }
}
