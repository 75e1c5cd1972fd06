//! Service registry over a revision-tokened document store
//!
//! Reads may be served from a short-lived local cache. Writes never trust
//! the cache: each one re-reads the document, checks the caller's revision,
//! applies the change and writes back with compare-and-swap. Any write
//! invalidates the cache.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cache::TtlCache;
use crate::config::DEFAULT_READ_CACHE_TTL_MS;
use crate::error::{AppError, StoreError};
use crate::service::service::{Service, ServicePatch};
use crate::store::filter::ServiceFilter;
use crate::store::{DocumentStore, Revision};

const SERVICE: &str = "Service";

/// Serialized form of the whole registry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryDocument {
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl RegistryDocument {
    /// Parse stored content; empty content is an empty registry
    pub fn parse(content: &str) -> Result<Self, StoreError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(content).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        serde_json::to_string_pretty(self).map_err(|e| StoreError::Corrupt(e.to_string()))
    }
}

/// Services as of one revision of the document
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub services: Vec<Service>,
    pub revision: Revision,
}

impl Snapshot {
    pub fn find(&self, id: &str) -> Option<&Service> {
        self.services.iter().find(|service| service.id == id)
    }
}

pub struct ServiceRegistry {
    store: Arc<dyn DocumentStore>,
    cache: TtlCache<(), Snapshot>,
}

impl ServiceRegistry {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self::with_read_cache_ttl(store, Duration::from_millis(DEFAULT_READ_CACHE_TTL_MS))
    }

    pub fn with_read_cache_ttl(store: Arc<dyn DocumentStore>, ttl: Duration) -> Self {
        Self {
            store,
            cache: TtlCache::new(ttl),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }

    /// Fresh read from the store; the returned revision authorizes a write
    pub async fn snapshot(&self) -> Result<Snapshot, AppError> {
        let document = self.store.read().await?;
        let parsed = RegistryDocument::parse(&document.content)?;
        let snapshot = Snapshot {
            services: parsed.services,
            revision: document.revision,
        };
        self.cache.insert((), snapshot.clone());
        Ok(snapshot)
    }

    /// Cached snapshot when still fresh, otherwise a store read
    async fn cached_snapshot(&self) -> Result<Snapshot, AppError> {
        if let Some(snapshot) = self.cache.get(&()) {
            debug!("Registry read served from cache");
            return Ok(snapshot);
        }
        self.snapshot().await
    }

    pub fn invalidate_cache(&self) {
        self.cache.clear();
    }

    pub async fn find_all(&self, filter: &ServiceFilter) -> Result<Vec<Service>, AppError> {
        let snapshot = self.cached_snapshot().await?;
        Ok(filter.apply(&snapshot.services))
    }

    pub async fn find_by_id(&self, id: &str) -> Result<Option<Service>, AppError> {
        let snapshot = self.cached_snapshot().await?;
        Ok(snapshot.find(id).cloned())
    }

    /// Case-insensitive name lookup
    pub async fn find_by_name(&self, name: &str) -> Result<Option<Service>, AppError> {
        let snapshot = self.cached_snapshot().await?;
        Ok(snapshot
            .services
            .into_iter()
            .find(|service| service.name.eq_ignore_ascii_case(name.trim())))
    }

    /// Insert a new service. Ids and names (case-insensitive) are unique.
    pub async fn save(&self, service: Service, expected: &Revision) -> Result<Revision, AppError> {
        let (_, revision) = self
            .commit(expected, |services| {
                ensure_unique(services, &service, None)?;
                services.push(service);
                Ok(())
            })
            .await?;
        Ok(revision)
    }

    /// Apply a partial update to one service
    pub async fn update(
        &self,
        id: &str,
        patch: ServicePatch,
        expected: &Revision,
    ) -> Result<(Service, Revision), AppError> {
        self.commit(expected, |services| {
            let index = services
                .iter()
                .position(|service| service.id == id)
                .ok_or_else(|| AppError::not_found(SERVICE, id))?;

            let updated = services[index].with_patch(patch, Utc::now());
            ensure_unique(services, &updated, Some(index))?;
            services[index] = updated.clone();
            Ok(updated)
        })
        .await
    }

    /// Replace stored services by id in one write. Services that are no
    /// longer stored are skipped.
    pub async fn save_all(
        &self,
        updated: Vec<Service>,
        expected: &Revision,
    ) -> Result<Revision, AppError> {
        let (_, revision) = self
            .commit(expected, |services| {
                for service in updated {
                    match services.iter_mut().find(|stored| stored.id == service.id) {
                        Some(stored) => *stored = service,
                        None => warn!("Skipping write of removed service {}", service.id),
                    }
                }
                Ok(())
            })
            .await?;
        Ok(revision)
    }

    pub async fn delete(&self, id: &str, expected: &Revision) -> Result<Revision, AppError> {
        let (_, revision) = self
            .commit(expected, |services| {
                let index = services
                    .iter()
                    .position(|service| service.id == id)
                    .ok_or_else(|| AppError::not_found(SERVICE, id))?;
                services.remove(index);
                Ok(())
            })
            .await?;
        Ok(revision)
    }

    /// Read-check-modify-write against the store.
    ///
    /// The document is always re-read; if its revision is not `expected`
    /// nothing is written and the call fails with a conflict.
    async fn commit<T, F>(&self, expected: &Revision, mutate: F) -> Result<(T, Revision), AppError>
    where
        F: FnOnce(&mut Vec<Service>) -> Result<T, AppError>,
    {
        self.invalidate_cache();

        let document = self.store.read().await?;
        if document.revision != *expected {
            warn!(
                "Registry changed since revision {} (now {})",
                expected, document.revision
            );
            return Err(StoreError::conflict(expected.as_str()).into());
        }

        let mut parsed = RegistryDocument::parse(&document.content)?;
        let output = mutate(&mut parsed.services)?;
        parsed.last_updated = Some(Utc::now());

        let result = self.store.write(parsed.to_json()?, expected).await;
        self.invalidate_cache();
        let revision = result?;

        info!(
            "Registry written ({} services) at revision {}",
            parsed.services.len(),
            revision
        );
        Ok((output, revision))
    }
}

fn ensure_unique(
    services: &[Service],
    candidate: &Service,
    skip: Option<usize>,
) -> Result<(), AppError> {
    for (index, existing) in services.iter().enumerate() {
        if Some(index) == skip {
            continue;
        }
        if existing.id == candidate.id {
            return Err(AppError::already_exists(SERVICE, candidate.id.clone()));
        }
        if existing.name.eq_ignore_ascii_case(&candidate.name) {
            return Err(AppError::already_exists(SERVICE, candidate.name.clone()));
        }
    }
    Ok(())
}
