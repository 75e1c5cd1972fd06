//! Consumer-facing operations
//!
//! ```text
//!   caller ──► VersionWatch ──► ServiceRegistry ──► DocumentStore
//!                   │
//!                   └──► CheckOrchestrator ──► VersionSource (per service)
//! ```
//!
//! Every operation resolves to an [`ApiResponse`]; errors and panics inside
//! an operation never escape as anything else.

pub mod input;
pub mod response;

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::compare::{self, Comparison};
use crate::config::{AppConfig, DEFAULT_CONFLICT_RETRIES};
use crate::error::{AppError, ConfigError, panic_message};
use crate::orchestrator::{CheckOrchestrator, CheckReport};
use crate::scraper::{HttpScraper, VersionSource};
use crate::service::check::{VersionCheckResult, apply_check_results};
use crate::service::platform::Platform;
use crate::service::service::{Service, ServicePatch};
use crate::store::filter::ServiceFilter;
use crate::store::open_store;
use crate::store::registry::ServiceRegistry;
use crate::version::semver::SemanticVersion;

pub use self::input::{
    CheckRequest, CompareRequest, CreateServiceInput, FieldError, PlatformVersionInput,
    UpdateServiceInput, UpdateVersionRequest,
};
pub use self::response::{ApiError, ApiResponse, ResponseMeta};

const SERVICE: &str = "Service";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeletedService {
    pub id: String,
}

pub struct VersionWatch {
    registry: ServiceRegistry,
    orchestrator: CheckOrchestrator,
    conflict_retries: u32,
}

impl VersionWatch {
    pub fn new(registry: ServiceRegistry, orchestrator: CheckOrchestrator) -> Self {
        Self {
            registry,
            orchestrator,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }

    /// Extra attempts after a write lost a revision race
    pub fn with_conflict_retries(mut self, retries: u32) -> Self {
        self.conflict_retries = retries;
        self
    }

    /// Wire the store backend and one HTTP scraper per configured service
    pub fn from_config(config: &AppConfig) -> Result<Self, ConfigError> {
        let store = open_store(&config.store)?;
        let registry = ServiceRegistry::with_read_cache_ttl(
            store,
            Duration::from_millis(config.store.read_cache_ttl_ms),
        );

        let mut orchestrator = CheckOrchestrator::new(config.check.concurrency);
        for scraper_config in &config.scrapers {
            let scraper = HttpScraper::new(scraper_config)?;
            orchestrator.register(scraper.service_id().to_string(), Arc::new(scraper));
        }

        info!(
            "Using {} store with {} scrapers",
            registry.backend_name(),
            config.scrapers.len()
        );

        Ok(Self::new(registry, orchestrator).with_conflict_retries(config.store.conflict_retries))
    }

    pub fn registry(&self) -> &ServiceRegistry {
        &self.registry
    }

    pub async fn get_all_services(&self, filter: &ServiceFilter) -> ApiResponse<Vec<Service>> {
        respond("get_all_services", self.registry.find_all(filter)).await
    }

    pub async fn get_service_by_id(&self, id: &str) -> ApiResponse<Service> {
        respond("get_service_by_id", async {
            self.registry
                .find_by_id(id)
                .await?
                .ok_or_else(|| AppError::not_found(SERVICE, id))
        })
        .await
    }

    /// Check latest versions, then write successful rows back to the
    /// registry. A failed write-back is logged and reported through
    /// `persisted`; the check results are returned either way.
    pub async fn check_version_updates(&self, request: CheckRequest) -> ApiResponse<CheckReport> {
        respond("check_version_updates", async {
            let snapshot = self.registry.snapshot().await?;
            let services = match &request.service_ids {
                Some(ids) => {
                    let missing: Vec<&String> =
                        ids.iter().filter(|id| snapshot.find(id).is_none()).collect();
                    if let Some(first) = missing.first() {
                        return Err(AppError::not_found(SERVICE, first.as_str()));
                    }
                    snapshot
                        .services
                        .into_iter()
                        .filter(|service| ids.contains(&service.id))
                        .collect()
                }
                None => snapshot.services,
            };

            let mut report = self
                .orchestrator
                .check_all_services(&services, &request.options)
                .await;
            report.persisted = self.write_back(&report.results).await;
            Ok(report)
        })
        .await
    }

    pub async fn compare_services(&self, request: CompareRequest) -> ApiResponse<Comparison> {
        respond("compare_services", async {
            let services = self.registry.find_all(&ServiceFilter::default()).await?;
            compare::compare_services(
                &request.service_ids,
                &services,
                request.platforms.as_deref(),
                Utc::now(),
            )
        })
        .await
    }

    /// Record a new current version for one configured platform
    pub async fn update_service_version(
        &self,
        request: UpdateVersionRequest,
    ) -> ApiResponse<Service> {
        respond("update_service_version", async {
            let platform: Platform = request.platform.parse().map_err(AppError::validation)?;
            let version = SemanticVersion::parse(request.new_version.trim())?;
            let registry = &self.registry;
            let service_id = request.service_id.as_str();

            self.retry_on_conflict("update_service_version", move || {
                let platform = platform.clone();
                let version = version.clone();
                async move {
                    let snapshot = registry.snapshot().await?;
                    let service = snapshot
                        .find(service_id)
                        .ok_or_else(|| AppError::not_found(SERVICE, service_id))?;
                    let current = service.platform(&platform).ok_or_else(|| {
                        AppError::validation(format!(
                            "Service {} has no {} platform",
                            service_id, platform
                        ))
                    })?;

                    let patch = ServicePatch {
                        platforms: vec![current.with_current(version)],
                        ..Default::default()
                    };
                    let (updated, _) = registry
                        .update(service_id, patch, &snapshot.revision)
                        .await?;
                    Ok(updated)
                }
            })
            .await
        })
        .await
    }

    pub async fn create_service(&self, input: CreateServiceInput) -> ApiResponse<Service> {
        respond("create_service", async {
            let service = input.into_service(Utc::now())?;
            let registry = &self.registry;

            self.retry_on_conflict("create_service", move || {
                let service = service.clone();
                async move {
                    let snapshot = registry.snapshot().await?;
                    registry.save(service.clone(), &snapshot.revision).await?;
                    info!("Created service {}", service.id);
                    Ok(service)
                }
            })
            .await
        })
        .await
    }

    pub async fn update_service(&self, id: &str, input: UpdateServiceInput) -> ApiResponse<Service> {
        respond("update_service", async {
            let patch = input.into_patch()?;
            let registry = &self.registry;

            self.retry_on_conflict("update_service", move || {
                let patch = patch.clone();
                async move {
                    let snapshot = registry.snapshot().await?;
                    let (updated, _) = registry.update(id, patch, &snapshot.revision).await?;
                    Ok(updated)
                }
            })
            .await
        })
        .await
    }

    pub async fn delete_service(&self, id: &str) -> ApiResponse<DeletedService> {
        respond("delete_service", async {
            let registry = &self.registry;

            self.retry_on_conflict("delete_service", move || async move {
                let snapshot = registry.snapshot().await?;
                registry.delete(id, &snapshot.revision).await?;
                info!("Deleted service {}", id);
                Ok(DeletedService { id: id.to_string() })
            })
            .await
        })
        .await
    }

    /// Persist successful check rows in a single registry write.
    ///
    /// Returns whether the registry now reflects the results.
    async fn write_back(&self, results: &[VersionCheckResult]) -> bool {
        if results.iter().all(VersionCheckResult::is_error) {
            return true;
        }

        let registry = &self.registry;
        let outcome = self
            .retry_on_conflict("check write-back", move || async move {
                let snapshot = registry.snapshot().await?;
                let now = Utc::now();
                let updated: Vec<Service> = snapshot
                    .services
                    .iter()
                    .filter_map(|service| apply_check_results(service, results, now))
                    .collect();
                if updated.is_empty() {
                    return Ok(());
                }
                registry.save_all(updated, &snapshot.revision).await?;
                Ok(())
            })
            .await;

        match outcome {
            Ok(()) => true,
            Err(e) => {
                error!("Failed to persist check results: {}", e);
                false
            }
        }
    }

    /// Re-run `attempt` from a fresh read while it keeps losing revision races
    async fn retry_on_conflict<T, F, Fut>(
        &self,
        operation: &str,
        mut attempt: F,
    ) -> Result<T, AppError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AppError>>,
    {
        let mut retries = 0;
        loop {
            match attempt().await {
                Err(e) if e.is_retryable() && retries < self.conflict_retries => {
                    retries += 1;
                    warn!(
                        "{} hit a conflict, retrying ({}/{}): {}",
                        operation, retries, self.conflict_retries, e
                    );
                }
                outcome => return outcome,
            }
        }
    }
}

/// Run one operation and fold its outcome, including a panic, into the envelope
async fn respond<T, F>(operation: &'static str, operation_future: F) -> ApiResponse<T>
where
    F: Future<Output = Result<T, AppError>>,
{
    let result = match AssertUnwindSafe(operation_future).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => Err(AppError::Internal(panic_message(&*panic))),
    };

    if let Err(e) = &result {
        match e {
            AppError::Store(_) | AppError::Internal(_) => error!("{} failed: {}", operation, e),
            _ => warn!("{} rejected: {}", operation, e),
        }
    }

    ApiResponse::from_result(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn respond_turns_panic_into_internal_error() {
        let exploded = true;
        let response: ApiResponse<()> = respond("boom", async move {
            if exploded {
                panic!("scraper exploded");
            }
            Ok(())
        })
        .await;

        assert!(!response.success);
        let error = response.error.unwrap();
        assert_eq!(error.code, crate::error::ErrorCode::InternalError);
        assert_eq!(error.message, "Internal error: scraper exploded");
    }

    #[tokio::test]
    async fn respond_wraps_success() {
        let response = respond("ok", async { Ok::<_, AppError>(7) }).await;

        assert!(response.success);
        assert_eq!(response.data, Some(7));
    }
}
