//! End-to-end API tests
//!
//! These drive the full router over the in-memory backend:
//! - batch issuance with a DLEQ proof
//! - redemption, double-spend conflict, and audit lookup
//! - rejection of tokens signed by unknown or retired keys
//! - request admission and size limits

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use rand::rngs::OsRng;
use serde_json::{json, Value};
use sha2::Sha512;
use std::sync::Arc;
use tower::ServiceExt;

use tollgate_server::{
    create_router, AppState, IssuerStore, MemoryStore, RedemptionLedger, ServerMetrics,
    StorageError,
};
use tollgate_voprf::{
    HmacSha512, SignedToken, Token, TokenPreimage, VerificationSignature,
};

// =============================================================================
// Test Helpers
// =============================================================================

fn test_state(store: Arc<MemoryStore>, admission_tokens: Option<Vec<String>>) -> Arc<AppState> {
    Arc::new(AppState {
        issuers: store.clone(),
        ledger: store,
        metrics: ServerMetrics::new().expect("metrics register"),
        admission_tokens,
        default_max_tokens: 40,
    })
}

fn app(store: Arc<MemoryStore>) -> Router {
    create_router(test_state(store, None))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    send_with_auth(app, method, uri, body, None).await
}

async fn send_with_auth(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    bearer: Option<&str>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match &body {
        Some(json) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(json).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

/// Client half of the protocol: unblind a signed token and produce the
/// redemption request for a payload.
fn redemption_request(
    token: &Token,
    signed: &SignedToken,
    payload: &str,
) -> (TokenPreimage, VerificationSignature) {
    let unblinded = token.unblind(signed).expect("valid signed token");
    let verification_key = unblinded.derive_verification_key::<Sha512>();
    let signature = verification_key.sign::<HmacSha512>(payload.as_bytes());
    (unblinded.t, signature)
}

/// Issue tokens through the endpoint and return the client-side tokens
/// paired with their signed counterparts.
async fn issue_through_api(app: Router, issuer_type: &str, count: usize) -> Vec<(Token, SignedToken)> {
    let mut rng = OsRng;
    let tokens: Vec<Token> = (0..count).map(|_| Token::random::<Sha512, _>(&mut rng)).collect();
    let blinded: Vec<_> = tokens.iter().map(Token::blind).collect();

    let (status, body) = send(
        app,
        "POST",
        &format!("/v1/blindedToken/{issuer_type}"),
        Some(json!({ "blinded_tokens": blinded })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let signed: Vec<SignedToken> = serde_json::from_value(body["signed_tokens"].clone()).unwrap();
    assert!(body["batch_proof"].as_str().is_some_and(|p| !p.is_empty()));

    tokens.into_iter().zip(signed).collect()
}

/// Percent-escape a base64 value for use in a query string.
fn query_escape(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
}

// =============================================================================
// Issuance
// =============================================================================

#[tokio::test]
async fn issue_signs_each_blinded_token_with_a_batch_proof() {
    let store = Arc::new(MemoryStore::new());
    let app = app(store);

    let (status, created) = send(
        app.clone(),
        "POST",
        "/v1/issuer/",
        Some(json!({
            "name": "demo",
            "max_tokens": 40,
            "expires_at": Utc::now() + Duration::days(30),
            "version": 2,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(created["public_key"].as_str().is_some_and(|k| !k.is_empty()));

    let signed = issue_through_api(app, "demo", 3).await;
    assert_eq!(signed.len(), 3);
}

#[tokio::test]
async fn issue_for_unknown_type_is_rejected() {
    let app = app(Arc::new(MemoryStore::new()));
    let (status, body) = send(
        app,
        "POST",
        "/v1/blindedToken/demo",
        Some(json!({ "blinded_tokens": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("does not exist"));
}

#[tokio::test]
async fn issue_with_empty_batch_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap();
    let app = app(store);

    let (status, _) = send(
        app,
        "POST",
        "/v1/blindedToken/demo",
        Some(json!({ "blinded_tokens": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn oversize_request_body_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap();
    let app = app(store);

    // Well past the 20 KiB cap.
    let huge = "A".repeat(64 * 1024);
    let (status, _) = send(
        app,
        "POST",
        "/v1/blindedToken/demo",
        Some(json!({ "blinded_tokens": [huge] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn issue_uses_the_newest_key() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(10)), 2)
        .await
        .unwrap();
    let newest = store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap();
    let app = app(store);

    let signed = issue_through_api(app.clone(), "demo", 1).await;
    let (token, signed_token) = &signed[0];
    let (preimage, signature) = redemption_request(token, signed_token, "");

    // The signature must rederive under the newest key only.
    tollgate_voprf::verify_token_redemption(
        &preimage,
        &signature,
        b"",
        &[newest.signing_key.as_ref()],
    )
    .expect("signed under the current issuer");
}

#[tokio::test]
async fn issuance_stops_once_every_key_is_retired() {
    let store = Arc::new(MemoryStore::new());
    let issuer = store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap();
    store.mark_rotated(issuer.id).await.unwrap();
    store.mark_retired(issuer.id).await.unwrap();

    let app = app(store);
    let (status, _) = send(
        app,
        "POST",
        "/v1/blindedToken/demo",
        Some(json!({ "blinded_tokens": ["AAAA"] })),
    )
    .await;
    // A retired key is never selected for signing.
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Redemption
// =============================================================================

#[tokio::test]
async fn redeem_once_succeeds_then_conflicts() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap();
    let app = app(store.clone());

    let signed = issue_through_api(app.clone(), "demo", 1).await;
    let (token, signed_token) = &signed[0];
    let (preimage, signature) = redemption_request(token, signed_token, "hello");

    let body = json!({ "t": preimage, "signature": signature, "payload": "hello" });

    let (status, _) = send(
        app.clone(),
        "POST",
        "/v1/blindedToken/demo/redemption/",
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, response) = send(
        app.clone(),
        "POST",
        "/v1/blindedToken/demo/redemption/",
        Some(body),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(response["message"], "Duplicate redemption");

    // Audit lookup sees the recorded redemption.
    let issuer = store.fetch_current("demo").await.unwrap();
    let uri = format!(
        "/v1/blindedToken/{}/redemption/?tokenId={}",
        issuer.id,
        query_escape(&preimage.encode_base64()),
    );
    let (status, redemption) = send(app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(redemption["payload"], "hello");
    assert_eq!(redemption["issuerId"], issuer.id.to_string());
}

#[tokio::test]
async fn redemption_signed_by_an_unknown_key_writes_nothing() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap();
    let app = app(store.clone());

    // Token signed under a key the server has never seen.
    let mut rng = OsRng;
    let foreign_key = tollgate_voprf::random_signing_key();
    let token = Token::random::<Sha512, _>(&mut rng);
    let signed = foreign_key.sign(&token.blind()).unwrap();
    let (preimage, signature) = redemption_request(&token, &signed, "hello");

    let (status, body) = send(
        app,
        "POST",
        "/v1/blindedToken/demo/redemption/",
        Some(json!({ "t": preimage, "signature": signature, "payload": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body["message"],
        "Could not verify that token redemption is valid"
    );

    // No ledger row was written.
    let issuer = store.fetch_current("demo").await.unwrap();
    assert!(matches!(
        store.fetch(&issuer, &preimage.encode_base64()).await,
        Err(StorageError::RedemptionNotFound)
    ));
}

#[tokio::test]
async fn redemption_with_tampered_payload_is_rejected() {
    let store = Arc::new(MemoryStore::new());
    store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap();
    let app = app(store);

    let signed = issue_through_api(app.clone(), "demo", 1).await;
    let (token, signed_token) = &signed[0];
    let (preimage, signature) = redemption_request(token, signed_token, "hello");

    // Same token, different payload than the one the MAC covers.
    let (status, _) = send(
        app,
        "POST",
        "/v1/blindedToken/demo/redemption/",
        Some(json!({ "t": preimage, "signature": signature, "payload": "goodbye" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn redemption_under_a_retired_key_is_rejected() {
    let store = Arc::new(MemoryStore::new());

    // An expired, already-rotated issuer with a live successor.
    let old = store
        .create_issuer("demo", 40, Some(Utc::now() - Duration::hours(1)), 2)
        .await
        .unwrap();
    store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap();
    store.mark_rotated(old.id).await.unwrap();

    // A token that verifies only under the old key.
    let mut rng = OsRng;
    let token = Token::random::<Sha512, _>(&mut rng);
    let signed = old.signing_key.sign(&token.blind()).unwrap();
    let (preimage, signature) = redemption_request(&token, &signed, "p");

    let app = app(store.clone());
    let body = json!({ "t": preimage, "signature": signature, "payload": "p" });

    // Before retirement the old key is still walked and verifies.
    let (status, _) = send(
        app.clone(),
        "POST",
        "/v1/blindedToken/demo/redemption/",
        Some(body.clone()),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let retired = store.retire_issuers().await.unwrap();
    assert_eq!(retired.len(), 1);

    // After retirement the key is out of the walk, so even a fresh
    // token signed under it cannot verify.
    let token2 = Token::random::<Sha512, _>(&mut rng);
    let signed2 = old.signing_key.sign(&token2.blind()).unwrap();
    let (preimage2, signature2) = redemption_request(&token2, &signed2, "p");

    let (status, _) = send(
        app,
        "POST",
        "/v1/blindedToken/demo/redemption/",
        Some(json!({ "t": preimage2, "signature": signature2, "payload": "p" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

// =============================================================================
// Admission & plumbing
// =============================================================================

#[tokio::test]
async fn admission_tokens_gate_the_token_routes() {
    let store = Arc::new(MemoryStore::new());
    let app = create_router(test_state(store, Some(vec!["sesame".to_string()])));

    let (status, _) = send(app.clone(), "GET", "/v1/issuer/demo", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) =
        send_with_auth(app.clone(), "GET", "/v1/issuer/demo", None, Some("wrong")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // A recognised token passes through to the handler, which reports
    // the missing issuer.
    let (status, _) =
        send_with_auth(app.clone(), "GET", "/v1/issuer/demo", None, Some("sesame")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // The heartbeat stays open.
    let (status, _) = send(app, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn heartbeat_and_metrics_respond() {
    let app = app(Arc::new(MemoryStore::new()));

    let (status, _) = send(app.clone(), "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let text = response.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&text).contains("tollgate_rotation_ticks_total"));
}

#[tokio::test]
async fn v2_issuer_without_expiry_is_rejected() {
    let app = app(Arc::new(MemoryStore::new()));
    let (status, _) = send(
        app,
        "POST",
        "/v1/issuer/",
        Some(json!({ "name": "demo", "version": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
