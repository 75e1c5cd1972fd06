//! Consumer-facing operations end to end over an in-memory registry

mod helper;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use indexmap::IndexMap;

use helper::{FakeSource, app, memory_store, service};
use version_watch::app::{
    CheckRequest, CreateServiceInput, PlatformVersionInput, UpdateServiceInput,
    UpdateVersionRequest, VersionWatch,
};
use version_watch::error::{ErrorCode, ScrapingFailureKind, StoreError};
use version_watch::orchestrator::CheckOrchestrator;
use version_watch::service::platform::Platform;
use version_watch::store::{
    Document, DocumentStore, MemoryDocumentStore, Revision, ServiceFilter, ServiceRegistry,
};
use version_watch::version::status::DriftStatus;

fn create_input(name: &str) -> CreateServiceInput {
    CreateServiceInput {
        name: name.to_string(),
        category: "payments".to_string(),
        description: "Checkout SDK".to_string(),
        documentation_url: "https://docs.example.com/checkout".to_string(),
        logo_url: None,
        platforms: IndexMap::from([(
            Platform::Ios,
            PlatformVersionInput {
                current: "23.1.0".to_string(),
                latest: None,
            },
        )]),
    }
}

#[tokio::test]
async fn check_writes_successful_rows_back_to_registry() {
    let store = memory_store(vec![
        service(
            "maps",
            &[
                (Platform::Web, "3.50.0", None),
                (Platform::Android, "18.0.0", Some("18.0.0")),
            ],
        ),
        service("pay", &[(Platform::Ios, "1.0.0", None)]),
    ]);
    let maps = Arc::new(
        FakeSource::new("maps")
            .with_latest(Platform::Web, "3.58.0")
            .with_failure(Platform::Android, ScrapingFailureKind::NoMatch),
    );
    let pay = Arc::new(FakeSource::new("pay").with_latest(Platform::Ios, "3.0.0"));
    let app = app(store, vec![maps, pay]);

    let response = app.check_version_updates(CheckRequest::default()).await;

    assert!(response.success);
    let report = response.data.unwrap();
    assert!(report.persisted);
    assert_eq!(report.summary.total_checked, 3);
    assert_eq!(report.summary.errors, 1);

    let maps = app.get_service_by_id("maps").await.data.unwrap();
    let web = maps.platform(&Platform::Web).unwrap();
    assert_eq!(web.latest().unwrap().to_string(), "3.58.0");
    assert_eq!(web.status(), DriftStatus::Outdated);
    assert!(web.last_checked().is_some());
    assert!(maps.last_checked.is_some());
    // the failed android lookup leaves the stored row untouched
    let android = maps.platform(&Platform::Android).unwrap();
    assert_eq!(android.status(), DriftStatus::Current);
    assert!(android.last_checked().is_none());

    let pay = app.get_service_by_id("pay").await.data.unwrap();
    assert_eq!(pay.overall_status(), DriftStatus::Critical);
}

#[tokio::test]
async fn check_of_selected_services_only_touches_those() {
    let store = memory_store(vec![
        service("maps", &[(Platform::Web, "1.0.0", None)]),
        service("pay", &[(Platform::Web, "1.0.0", None)]),
    ]);
    let maps = Arc::new(FakeSource::new("maps").with_latest(Platform::Web, "1.1.0"));
    let pay = Arc::new(FakeSource::new("pay").with_latest(Platform::Web, "1.1.0"));
    let app = app(store, vec![maps.clone(), pay.clone()]);

    let response = app
        .check_version_updates(CheckRequest {
            service_ids: Some(vec!["pay".to_string()]),
            ..Default::default()
        })
        .await;

    assert!(response.success);
    assert_eq!(maps.calls(), 0);
    assert_eq!(pay.calls(), 1);
}

#[tokio::test]
async fn check_of_unknown_service_is_not_found() {
    let store = memory_store(vec![service("maps", &[(Platform::Web, "1.0.0", None)])]);
    let app = app(store, Vec::new());

    let response = app
        .check_version_updates(CheckRequest {
            service_ids: Some(vec!["ghost".to_string()]),
            ..Default::default()
        })
        .await;

    assert_eq!(response.error_code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn panicking_source_keeps_healthy_rows_and_persists_them() {
    let store = memory_store(vec![
        service("maps", &[(Platform::Web, "1.0.0", None)]),
        service("pay", &[(Platform::Ios, "2.0.0", None)]),
    ]);
    let maps = Arc::new(
        FakeSource::new("maps")
            .with_latest(Platform::Web, "1.1.0")
            .panicking(),
    );
    let pay = Arc::new(FakeSource::new("pay").with_latest(Platform::Ios, "2.3.0"));
    let app = app(store, vec![maps, pay]);

    let response = app.check_version_updates(CheckRequest::default()).await;

    assert!(response.success);
    let report = response.data.unwrap();
    assert!(report.persisted);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.summary.errors, 1);

    let crashed = report.results.iter().find(|r| r.service_id == "maps").unwrap();
    assert!(
        crashed
            .error
            .as_deref()
            .is_some_and(|e| e.contains("source for maps crashed"))
    );

    let pay = app.get_service_by_id("pay").await.data.unwrap();
    let ios = pay.platform(&Platform::Ios).unwrap();
    assert_eq!(ios.latest().unwrap().to_string(), "2.3.0");
    assert_eq!(ios.status(), DriftStatus::Warning);

    let maps = app.get_service_by_id("maps").await.data.unwrap();
    assert!(maps.platform(&Platform::Web).unwrap().latest().is_none());
}

#[tokio::test]
async fn create_then_list_filter_and_reject_duplicate_name() {
    let app = app(memory_store(Vec::new()), Vec::new());

    let created = app.create_service(create_input("Stripe Checkout")).await;
    assert!(created.success);
    let created = created.data.unwrap();
    assert_eq!(created.id, "stripe-checkout");
    assert_eq!(created.overall_status(), DriftStatus::Unknown);

    let listed = app
        .get_all_services(&ServiceFilter::default().with_category("PAYMENTS"))
        .await
        .data
        .unwrap();
    assert_eq!(listed.len(), 1);

    let listed = app
        .get_all_services(&ServiceFilter::default().with_platform(Platform::Web))
        .await
        .data
        .unwrap();
    assert!(listed.is_empty());

    let duplicate = app.create_service(create_input("stripe checkout")).await;
    assert_eq!(duplicate.error_code(), Some(ErrorCode::AlreadyExists));
}

#[tokio::test]
async fn create_with_invalid_fields_lists_them() {
    let app = app(memory_store(Vec::new()), Vec::new());
    let input = CreateServiceInput {
        documentation_url: "docs".to_string(),
        platforms: IndexMap::new(),
        ..create_input("Stripe")
    };

    let response = app.create_service(input).await;

    let error = response.error.unwrap();
    assert_eq!(error.code, ErrorCode::ValidationError);
    let fields = error.details.unwrap()["fields"].as_array().unwrap().len();
    assert_eq!(fields, 2);
}

#[tokio::test]
async fn update_service_version_recomputes_status() {
    let store = memory_store(vec![service(
        "maps",
        &[(Platform::Web, "1.0.0", Some("3.0.0"))],
    )]);
    let app = app(store, Vec::new());

    let response = app
        .update_service_version(UpdateVersionRequest {
            service_id: "maps".to_string(),
            platform: "WEB".to_string(),
            new_version: "2.9.0".to_string(),
        })
        .await;

    let updated = response.data.unwrap();
    let web = updated.platform(&Platform::Web).unwrap();
    assert_eq!(web.current().to_string(), "2.9.0");
    assert_eq!(web.status(), DriftStatus::Outdated);

    let stored = app.get_service_by_id("maps").await.data.unwrap();
    assert_eq!(stored, updated);
}

#[tokio::test]
async fn update_service_version_rejects_bad_requests() {
    let store = memory_store(vec![service("maps", &[(Platform::Web, "1.0.0", None)])]);
    let app = app(store, Vec::new());

    let request = |id: &str, platform: &str, version: &str| UpdateVersionRequest {
        service_id: id.to_string(),
        platform: platform.to_string(),
        new_version: version.to_string(),
    };

    let unconfigured = app
        .update_service_version(request("maps", "android", "1.0.0"))
        .await;
    assert_eq!(unconfigured.error_code(), Some(ErrorCode::ValidationError));

    let invalid = app
        .update_service_version(request("maps", "web", "v2"))
        .await;
    assert_eq!(invalid.error_code(), Some(ErrorCode::ValidationError));

    let missing = app
        .update_service_version(request("ghost", "web", "1.0.0"))
        .await;
    assert_eq!(missing.error_code(), Some(ErrorCode::NotFound));
}

#[tokio::test]
async fn update_and_delete_service() {
    let store = memory_store(vec![service("maps", &[(Platform::Web, "1.0.0", None)])]);
    let app = app(store, Vec::new());

    let updated = app
        .update_service(
            "maps",
            UpdateServiceInput {
                description: Some("Map tiles".to_string()),
                ..Default::default()
            },
        )
        .await
        .data
        .unwrap();
    assert_eq!(updated.description, "Map tiles");
    assert_eq!(updated.id, "maps");

    let deleted = app.delete_service("maps").await;
    assert_eq!(deleted.data.unwrap().id, "maps");

    let gone = app.get_service_by_id("maps").await;
    assert_eq!(gone.error_code(), Some(ErrorCode::NotFound));
    let again = app.delete_service("maps").await;
    assert_eq!(again.error_code(), Some(ErrorCode::NotFound));
}

/// Bumps the wrapped store behind the caller's back before the first write
struct RacingStore {
    inner: MemoryDocumentStore,
    raced: AtomicBool,
}

#[async_trait]
impl DocumentStore for RacingStore {
    fn backend_name(&self) -> &'static str {
        "racing"
    }

    async fn read(&self) -> Result<Document, StoreError> {
        self.inner.read().await
    }

    async fn write(&self, content: String, expected: &Revision) -> Result<Revision, StoreError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            let current = self.inner.read().await?;
            self.inner.write(current.content, &current.revision).await?;
        }
        self.inner.write(content, expected).await
    }
}

#[tokio::test]
async fn writes_retry_after_losing_a_revision_race() {
    let seeded = memory_store(vec![service("maps", &[(Platform::Web, "1.0.0", None)])]);
    let store = Arc::new(RacingStore {
        inner: MemoryDocumentStore::with_content(seeded.read().await.unwrap().content),
        raced: AtomicBool::new(false),
    });
    let app = VersionWatch::new(ServiceRegistry::new(store.clone()), CheckOrchestrator::default());

    let response = app
        .update_service(
            "maps",
            UpdateServiceInput {
                category: Some("location".to_string()),
                ..Default::default()
            },
        )
        .await;

    assert!(response.success);
    let stored = app.get_service_by_id("maps").await.data.unwrap();
    assert_eq!(stored.category, "location");
    // seeded at 0, raced to 1, written at 2
    assert_eq!(store.read().await.unwrap().revision, Revision::new("2"));
}

#[tokio::test]
async fn conflicts_surface_once_retries_are_exhausted() {
    let seeded = memory_store(vec![service("maps", &[(Platform::Web, "1.0.0", None)])]);
    let store = Arc::new(RacingStore {
        inner: MemoryDocumentStore::with_content(seeded.read().await.unwrap().content),
        raced: AtomicBool::new(false),
    });
    let app = VersionWatch::new(ServiceRegistry::new(store), CheckOrchestrator::default())
        .with_conflict_retries(0);

    let response = app.delete_service("maps").await;

    let error = response.error.unwrap();
    assert_eq!(error.code, ErrorCode::Conflict);
}
