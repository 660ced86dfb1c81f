//! API module for the tollgate server

pub mod auth;
pub mod error;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use error::ApiError;
use handlers::AppState;

/// Request bodies are capped at 20 KiB, the expected size for a batch
/// of ~100 base64-encoded blinded tokens plus framing.
pub const MAX_REQUEST_SIZE: usize = 20 * 1024;

/// Per-request deadline. Both ledger backends commit atomically at the
/// statement level, so cancellation needs no compensating action.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Heartbeat endpoint
///
/// GET /
async fn heartbeat() -> &'static str {
    "."
}

/// Prometheus text exposition
///
/// GET /metrics
async fn metrics(State(state): State<Arc<AppState>>) -> Result<String, ApiError> {
    state
        .metrics
        .export()
        .map_err(|_| ApiError::Internal("Could not gather metrics"))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    // Token endpoints: issue, redeem, audit lookup. The redeem and
    // lookup routes share a path shape; they are distinguished by
    // method, as in the original surface.
    let token_routes = Router::new()
        .route("/{type}", post(handlers::issue_tokens))
        .route(
            "/{type}/redemption/",
            post(handlers::redeem_token).get(handlers::check_redemption),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    let issuer_routes = Router::new()
        .route("/", post(handlers::create_issuer))
        .route("/{type}", get(handlers::get_issuer))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/", get(heartbeat))
        .route("/metrics", get(metrics))
        .nest("/v1/blindedToken", token_routes)
        .nest("/v1/issuer", issuer_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_SIZE))
        .with_state(state)
}
