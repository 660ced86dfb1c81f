//! Redemption ledger tests
//!
//! Duplicate detection across backends, version dispatch through the
//! dual ledger, concurrent redemption of one preimage, and read-cache
//! behaviour.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{Duration, Utc};

use tollgate_server::{
    Issuer, IssuerStore, Ledger, MemoryStore, RedemptionLedger, StorageError,
};

async fn v1_issuer(store: &MemoryStore) -> Issuer {
    store.create_issuer("demo", 40, None, 1).await.unwrap()
}

async fn v2_issuer(store: &MemoryStore) -> Issuer {
    store
        .create_issuer("demo", 40, Some(Utc::now() + Duration::days(30)), 2)
        .await
        .unwrap()
}

#[tokio::test]
async fn dual_ledger_dispatches_on_issuer_version() {
    let relational = Arc::new(MemoryStore::new());
    let kv = Arc::new(MemoryStore::new());
    let ledger = Ledger::new(relational.clone(), kv.clone());

    let v1 = v1_issuer(&relational).await;
    let v2 = v2_issuer(&relational).await;

    ledger.record(&v1, "preimage-v1", "a").await.unwrap();
    ledger.record(&v2, "preimage-v2", "b").await.unwrap();

    // v1 lands in the relational backend only.
    assert!(relational.fetch(&v1, "preimage-v1").await.is_ok());
    assert!(matches!(
        kv.fetch(&v1, "preimage-v1").await,
        Err(StorageError::RedemptionNotFound)
    ));

    // v2 lands in the key-value backend only, with its TTL pinned to
    // the issuer's expiry.
    let recorded = kv.fetch(&v2, "preimage-v2").await.unwrap();
    assert_eq!(recorded.ttl, v2.expires_at.map(|at| at.timestamp()));
    assert!(matches!(
        relational.fetch(&v2, "preimage-v2").await,
        Err(StorageError::RedemptionNotFound)
    ));
}

#[tokio::test]
async fn second_redemption_is_a_duplicate_on_both_backends() {
    let relational = Arc::new(MemoryStore::new());
    let kv = Arc::new(MemoryStore::new());
    let ledger = Ledger::new(relational.clone(), kv.clone());

    for issuer in [v1_issuer(&relational).await, v2_issuer(&relational).await] {
        ledger.record(&issuer, "preimage", "payload").await.unwrap();
        assert!(matches!(
            ledger.record(&issuer, "preimage", "payload").await,
            Err(StorageError::DuplicateRedemption)
        ));
    }
}

#[tokio::test]
async fn concurrent_redemptions_have_exactly_one_winner() {
    let store = Arc::new(MemoryStore::new());
    let issuer = v2_issuer(&store).await;

    let mut handles = Vec::new();
    for _ in 0..100 {
        let store = store.clone();
        let issuer = issuer.clone();
        handles.push(tokio::spawn(async move {
            store.record(&issuer, "contended-preimage", "p").await
        }));
    }

    let mut ok = 0;
    let mut duplicates = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(()) => ok += 1,
            Err(StorageError::DuplicateRedemption) => duplicates += 1,
            Err(e) => panic!("unexpected ledger error: {e}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(duplicates, 99);
}

#[tokio::test]
async fn a_recorded_redemption_is_immediately_readable() {
    let store = Arc::new(MemoryStore::new());
    let issuer = v2_issuer(&store).await;

    store.record(&issuer, "preimage", "hello").await.unwrap();

    let redemption = store.fetch(&issuer, "preimage").await.unwrap();
    assert_eq!(redemption.issuer_id, issuer.id);
    assert_eq!(redemption.id, "preimage");
    assert_eq!(redemption.payload, "hello");
    assert!(redemption.timestamp <= Utc::now());
}

#[tokio::test]
async fn read_cache_does_not_cache_absence() {
    let store = Arc::new(MemoryStore::new());
    let ledger =
        Ledger::new(store.clone(), store.clone()).with_cache(StdDuration::from_secs(300));

    let issuer = v2_issuer(&store).await;

    // A miss is not cached…
    assert!(matches!(
        ledger.fetch(&issuer, "preimage").await,
        Err(StorageError::RedemptionNotFound)
    ));

    // …so the record becomes visible on the next fetch, and stays
    // visible once cached.
    ledger.record(&issuer, "preimage", "x").await.unwrap();
    assert_eq!(ledger.fetch(&issuer, "preimage").await.unwrap().payload, "x");
    assert_eq!(ledger.fetch(&issuer, "preimage").await.unwrap().payload, "x");
}

#[tokio::test]
async fn duplicate_detection_survives_the_read_cache() {
    let store = Arc::new(MemoryStore::new());
    let ledger =
        Ledger::new(store.clone(), store.clone()).with_cache(StdDuration::from_secs(300));

    let issuer = v2_issuer(&store).await;

    ledger.record(&issuer, "preimage", "x").await.unwrap();
    let _ = ledger.fetch(&issuer, "preimage").await.unwrap();

    assert!(matches!(
        ledger.record(&issuer, "preimage", "x").await,
        Err(StorageError::DuplicateRedemption)
    ));
}
