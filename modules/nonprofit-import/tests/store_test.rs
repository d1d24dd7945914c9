//! Integration tests for PgOrgStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use nonprofit_import::document::{sanitize, Document, SanitizedRecord};
use nonprofit_import::traits::PersistenceGateway;
use nonprofit_import::types::ReviewStatus;
use nonprofit_import::PgOrgStore;
use serde_json::{json, Value};
use sqlx::PgPool;

/// Get a migrated store, or skip if no test DB is available.
async fn test_store() -> Option<PgOrgStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    let store = PgOrgStore::new(pool);
    store.migrate().await.ok()?;
    Some(store)
}

fn clean(value: Value) -> SanitizedRecord {
    sanitize(Document::from(value)).unwrap()
}

/// Tests share one database, so each uses its own EIN.
fn unique_ein() -> String {
    let n = uuid::Uuid::new_v4().as_u128() % 1_000_000_000;
    format!("{:0>2}-{:0>7}", n / 10_000_000, n % 10_000_000)
}

#[tokio::test]
async fn first_upsert_creates_pending_record() {
    let Some(store) = test_store().await else {
        return;
    };
    let ein = unique_ein();

    let id = store
        .upsert(&ein, clean(json!({"ein": ein, "name": "Food Shelf", "assetAmount": 10})))
        .await
        .unwrap();

    let stored = store.get(&ein).await.unwrap().unwrap();
    assert_eq!(stored.id, id);
    assert_eq!(stored.record["name"], json!("Food Shelf"));
    assert_eq!(stored.source_system, "propublica");
    assert_eq!(stored.review_status, ReviewStatus::Pending);
    assert!(stored.import_history.is_empty());
}

#[tokio::test]
async fn repeat_upsert_merges_and_records_history() {
    let Some(store) = test_store().await else {
        return;
    };
    let ein = unique_ein();

    let first = store
        .upsert(&ein, clean(json!({"ein": ein, "name": "Old Name", "assetAmount": 10})))
        .await
        .unwrap();
    let second = store
        .upsert(&ein, clean(json!({"ein": ein, "name": "New Name", "assetAmount": 25})))
        .await
        .unwrap();
    assert_eq!(first, second);

    let stored = store.get(&ein).await.unwrap().unwrap();
    assert_eq!(stored.record["name"], json!("New Name"));
    assert_eq!(stored.record["assetAmount"], json!(25));
    assert_eq!(stored.import_history.len(), 1);
    assert_eq!(stored.import_history[0].previous, json!({"assetAmount": 10}));
    assert!(stored.updated_at >= stored.imported_at);
}

#[tokio::test]
async fn known_ids_includes_persisted_eins() {
    let Some(store) = test_store().await else {
        return;
    };
    let ein = unique_ein();
    assert!(!store.known_ids().await.unwrap().contains(&ein));

    store
        .upsert(&ein, clean(json!({"ein": ein, "name": "Counted"})))
        .await
        .unwrap();

    assert!(store.known_ids().await.unwrap().contains(&ein));
}

#[tokio::test]
async fn missing_ein_returns_none() {
    let Some(store) = test_store().await else {
        return;
    };
    assert!(store.get(&unique_ein()).await.unwrap().is_none());
}
