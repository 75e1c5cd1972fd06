//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use version_watch::app::VersionWatch;
use version_watch::error::{ScrapingFailure, ScrapingFailureKind};
use version_watch::orchestrator::CheckOrchestrator;
use version_watch::scraper::{ScrapedVersionInfo, VersionSource};
use version_watch::service::platform::Platform;
use version_watch::service::platform_version::PlatformVersion;
use version_watch::service::service::Service;
use version_watch::store::{
    DocumentStore, MemoryDocumentStore, RegistryDocument, Revision, ServiceRegistry,
};
use version_watch::version::semver::SemanticVersion;

/// Scripted version source for one service
pub struct FakeSource {
    service_id: String,
    latest: HashMap<Platform, Result<String, ScrapingFailureKind>>,
    delay: Option<Duration>,
    panics: bool,
    calls: AtomicUsize,
    clears: AtomicUsize,
}

impl FakeSource {
    pub fn new(service_id: &str) -> Self {
        Self {
            service_id: service_id.to_string(),
            latest: HashMap::new(),
            delay: None,
            panics: false,
            calls: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        }
    }

    pub fn with_latest(mut self, platform: Platform, version: &str) -> Self {
        self.latest.insert(platform, Ok(version.to_string()));
        self
    }

    pub fn with_failure(mut self, platform: Platform, kind: ScrapingFailureKind) -> Self {
        self.latest.insert(platform, Err(kind));
        self
    }

    /// Sleep this long before answering each lookup
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionSource for FakeSource {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    async fn scrape_latest(
        &self,
        platform: &Platform,
    ) -> Result<ScrapedVersionInfo, ScrapingFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panics {
            panic!("source for {} crashed", self.service_id);
        }

        let url = format!("https://example.com/{}/{}", self.service_id, platform);
        match self.latest.get(platform) {
            Some(Ok(version)) => {
                let version = SemanticVersion::parse(version).map_err(|e| {
                    ScrapingFailure::new(&url, ScrapingFailureKind::InvalidVersion, e.to_string())
                })?;
                Ok(ScrapedVersionInfo::new(
                    platform.clone(),
                    version,
                    url,
                    Utc::now(),
                ))
            }
            Some(Err(kind)) => Err(ScrapingFailure::new(url, *kind, "scripted failure")),
            None => Err(ScrapingFailure::new(
                url,
                ScrapingFailureKind::NotConfigured,
                "no source for platform",
            )),
        }
    }

    fn clear_cache(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn version(text: &str) -> SemanticVersion {
    SemanticVersion::parse(text).unwrap()
}

/// Service named after its id with the given (platform, current, latest) triples
pub fn service(id: &str, platforms: &[(Platform, &str, Option<&str>)]) -> Service {
    platforms.iter().fold(
        Service::new(id, id.to_uppercase(), "sdk", Utc::now())
            .with_documentation_url(format!("https://docs.example.com/{}", id)),
        |service, (platform, current, latest)| {
            service.with_platform(PlatformVersion::with_latest(
                platform.clone(),
                version(current),
                latest.map(version),
            ))
        },
    )
}

/// Memory store pre-loaded with a registry document holding `services`
pub fn memory_store(services: Vec<Service>) -> Arc<MemoryDocumentStore> {
    let document = RegistryDocument {
        services,
        last_updated: None,
    };
    Arc::new(MemoryDocumentStore::with_content(
        document.to_json().unwrap(),
    ))
}

pub fn registry(store: Arc<dyn DocumentStore>) -> ServiceRegistry {
    ServiceRegistry::new(store)
}

pub async fn current_revision(store: &dyn DocumentStore) -> Revision {
    store.read().await.unwrap().revision
}

/// App over an in-memory registry with the given sources registered
pub fn app(
    store: Arc<MemoryDocumentStore>,
    sources: Vec<Arc<FakeSource>>,
) -> VersionWatch {
    let orchestrator = sources
        .into_iter()
        .fold(CheckOrchestrator::default(), |orchestrator, source| {
            let id = source.service_id().to_string();
            orchestrator.with_scraper(id, source)
        });
    VersionWatch::new(ServiceRegistry::new(store), orchestrator)
}
