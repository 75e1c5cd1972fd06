//! Optimistic concurrency through the registry, across store backends

mod helper;

use std::sync::Arc;

use chrono::Utc;
use tempfile::TempDir;

use helper::{current_revision, memory_store, service};
use version_watch::error::{AppError, ErrorCode};
use version_watch::service::platform::Platform;
use version_watch::service::service::ServicePatch;
use version_watch::store::{DocumentStore, ServiceRegistry, SqliteDocumentStore};

fn sqlite_store(temp_dir: &TempDir) -> Arc<SqliteDocumentStore> {
    Arc::new(SqliteDocumentStore::open(&temp_dir.path().join("registry.db")).unwrap())
}

async fn assert_stale_token_is_rejected(store: Arc<dyn DocumentStore>) {
    let registry = ServiceRegistry::new(store.clone());
    let initial = registry.snapshot().await.unwrap().revision;
    registry
        .save(
            service("alpha", &[(Platform::Web, "1.0.0", None)]),
            &initial,
        )
        .await
        .unwrap();

    let before = store.read().await.unwrap();

    // `initial` was superseded by the save above
    let result = registry
        .save(service("bravo", &[(Platform::Ios, "2.0.0", None)]), &initial)
        .await;

    let err = result.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)), "got {:?}", err);
    assert_eq!(err.code(), ErrorCode::Conflict);
    assert!(err.is_retryable());

    let after = store.read().await.unwrap();
    assert_eq!(after.content, before.content);
    assert_eq!(after.revision, before.revision);
}

async fn assert_fresh_token_advances_revision(store: Arc<dyn DocumentStore>) {
    let registry = ServiceRegistry::new(store.clone());
    let first = registry.snapshot().await.unwrap().revision;

    let second = registry
        .save(
            service("alpha", &[(Platform::Web, "1.0.0", None)]),
            &first,
        )
        .await
        .unwrap();
    assert_ne!(second, first);
    assert_eq!(current_revision(store.as_ref()).await, second);

    let third = registry
        .save(service("bravo", &[(Platform::Ios, "2.0.0", None)]), &second)
        .await
        .unwrap();
    assert_ne!(third, second);

    let snapshot = registry.snapshot().await.unwrap();
    assert_eq!(snapshot.revision, third);
    let ids: Vec<_> = snapshot.services.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["alpha", "bravo"]);
}

#[tokio::test]
async fn memory_store_rejects_stale_token() {
    assert_stale_token_is_rejected(memory_store(Vec::new())).await;
}

#[tokio::test]
async fn memory_store_accepts_fresh_token() {
    assert_fresh_token_advances_revision(memory_store(Vec::new())).await;
}

#[tokio::test]
async fn sqlite_store_rejects_stale_token() {
    let temp_dir = TempDir::new().unwrap();
    assert_stale_token_is_rejected(sqlite_store(&temp_dir)).await;
}

#[tokio::test]
async fn sqlite_store_accepts_fresh_token() {
    let temp_dir = TempDir::new().unwrap();
    assert_fresh_token_advances_revision(sqlite_store(&temp_dir)).await;
}

#[tokio::test]
async fn sqlite_registry_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    {
        let registry = ServiceRegistry::new(sqlite_store(&temp_dir));
        let revision = registry.snapshot().await.unwrap().revision;
        registry
            .save(service("alpha", &[(Platform::Web, "1.4.2", Some("1.5.0"))]), &revision)
            .await
            .unwrap();
    }

    let registry = ServiceRegistry::new(sqlite_store(&temp_dir));
    let stored = registry.find_by_id("alpha").await.unwrap().unwrap();
    assert_eq!(
        stored.platform(&Platform::Web).unwrap().current().to_string(),
        "1.4.2"
    );
}

#[tokio::test]
async fn concurrent_writers_from_one_revision_have_one_winner() {
    let store = memory_store(vec![service("alpha", &[(Platform::Web, "1.0.0", None)])]);
    let first = Arc::new(ServiceRegistry::new(store.clone()));
    let second = Arc::new(ServiceRegistry::new(store.clone()));
    let revision = first.snapshot().await.unwrap().revision;

    let rename = |name: &str| ServicePatch {
        name: Some(name.to_string()),
        ..Default::default()
    };

    let (a, b) = tokio::join!(
        first.update("alpha", rename("Alpha One"), &revision),
        second.update("alpha", rename("Alpha Two"), &revision),
    );

    let outcomes = [a.is_ok(), b.is_ok()];
    assert_eq!(outcomes.iter().filter(|ok| **ok).count(), 1);

    let stored = first.snapshot().await.unwrap();
    let name = &stored.find("alpha").unwrap().name;
    assert!(name == "Alpha One" || name == "Alpha Two");
}

#[tokio::test]
async fn reads_are_served_from_cache_until_a_write() {
    let store = memory_store(vec![service("alpha", &[(Platform::Web, "1.0.0", None)])]);
    let registry = ServiceRegistry::new(store.clone());
    assert_eq!(registry.find_all(&Default::default()).await.unwrap().len(), 1);

    // out-of-band write the cached registry does not see yet
    let revision = current_revision(store.as_ref()).await;
    store
        .write(String::new(), &revision)
        .await
        .unwrap();
    assert_eq!(registry.find_all(&Default::default()).await.unwrap().len(), 1);

    registry.invalidate_cache();
    assert!(registry.find_all(&Default::default()).await.unwrap().is_empty());
}

#[tokio::test]
async fn update_keeps_identity_and_bumps_updated_at() {
    let store = memory_store(vec![service("alpha", &[(Platform::Web, "1.0.0", None)])]);
    let registry = ServiceRegistry::new(store);
    let before = registry.snapshot().await.unwrap();
    let original = before.find("alpha").unwrap().clone();

    let (updated, revision) = registry
        .update(
            "alpha",
            ServicePatch {
                category: Some("payments".to_string()),
                ..Default::default()
            },
            &before.revision,
        )
        .await
        .unwrap();

    assert_eq!(updated.id, original.id);
    assert_eq!(updated.created_at, original.created_at);
    assert!(updated.updated_at >= original.updated_at);
    assert!(updated.updated_at <= Utc::now());
    assert_eq!(updated.category, "payments");
    assert_ne!(revision, before.revision);
}
