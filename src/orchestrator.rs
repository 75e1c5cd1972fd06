//! Fans a version check out across services with bounded concurrency
//!
//! Services are processed in batches of `concurrency`; services within a
//! batch run concurrently and each service checks its platforms one after
//! another in configured order. A failed lookup, or a source that panics,
//! becomes an error row and never aborts its siblings.

use std::collections::{BTreeMap, HashMap};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::Utc;
use futures::FutureExt;
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::DEFAULT_CHECK_CONCURRENCY;
use crate::error::panic_message;
use crate::scraper::VersionSource;
use crate::service::check::{CheckSummary, VersionCheckResult};
use crate::service::platform::Platform;
use crate::service::service::Service;

/// Per-call overrides for a check run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckOptions {
    /// Batch width; falls back to the orchestrator default
    pub concurrency: Option<usize>,
    /// Only check these platforms (when configured on the service)
    pub platforms: Option<Vec<Platform>>,
    /// Clear scraper caches before checking
    pub force_refresh: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckReport {
    pub results: Vec<VersionCheckResult>,
    pub summary: CheckSummary,
    /// Scraper availability per requested service id
    pub scraper_health: BTreeMap<String, bool>,
    /// Whether successful rows were written back to the registry
    pub persisted: bool,
}

pub struct CheckOrchestrator {
    scrapers: HashMap<String, Arc<dyn VersionSource>>,
    concurrency: usize,
}

impl Default for CheckOrchestrator {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_CONCURRENCY)
    }
}

impl CheckOrchestrator {
    pub fn new(concurrency: usize) -> Self {
        Self {
            scrapers: HashMap::new(),
            concurrency: concurrency.max(1),
        }
    }

    /// Register the source answering for `service_id`, replacing any previous one
    pub fn register(&mut self, service_id: impl Into<String>, scraper: Arc<dyn VersionSource>) {
        self.scrapers.insert(service_id.into(), scraper);
    }

    pub fn with_scraper(
        mut self,
        service_id: impl Into<String>,
        scraper: Arc<dyn VersionSource>,
    ) -> Self {
        self.register(service_id, scraper);
        self
    }

    pub fn has_scraper(&self, service_id: &str) -> bool {
        self.scrapers.contains_key(service_id)
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub async fn check_all_services(
        &self,
        services: &[Service],
        options: &CheckOptions,
    ) -> CheckReport {
        let width = options.concurrency.unwrap_or(self.concurrency).max(1);

        if options.force_refresh {
            for service in services {
                if let Some(scraper) = self.scrapers.get(&service.id) {
                    scraper.clear_cache();
                }
            }
        }

        let mut results = Vec::new();
        let mut scraper_health = BTreeMap::new();

        for (index, batch) in services.chunks(width).enumerate() {
            info!(
                "Checking batch {} ({} services, width {})",
                index + 1,
                batch.len(),
                width
            );

            let outcomes = join_all(
                batch
                    .iter()
                    .map(|service| self.check_service(service, options.platforms.as_deref())),
            )
            .await;

            for (service, rows) in batch.iter().zip(outcomes) {
                let healthy = match &rows {
                    Some(rows) => rows.is_empty() || rows.iter().any(|row| !row.is_error()),
                    None => false,
                };
                scraper_health.insert(service.id.clone(), healthy);
                results.extend(rows.unwrap_or_default());
            }
        }

        let summary = CheckSummary::from_results(&results);
        info!(
            "Checked {} rows across {} services: {} updates, {} critical, {} errors",
            summary.total_checked,
            summary.services_checked,
            summary.updates_available,
            summary.critical_updates,
            summary.errors
        );

        CheckReport {
            results,
            summary,
            scraper_health,
            persisted: false,
        }
    }

    /// Check every (selected) platform of one service sequentially.
    ///
    /// Returns `None` when no scraper is registered for the service.
    async fn check_service(
        &self,
        service: &Service,
        only: Option<&[Platform]>,
    ) -> Option<Vec<VersionCheckResult>> {
        let Some(scraper) = self.scrapers.get(&service.id) else {
            debug!("No scraper registered for {}, skipping", service.id);
            return None;
        };

        let mut rows = Vec::new();
        for version in service.platforms() {
            let platform = version.platform();
            if only.is_some_and(|only| !only.contains(platform)) {
                continue;
            }

            let lookup = AssertUnwindSafe(scraper.scrape_latest(platform))
                .catch_unwind()
                .await;
            let row = match lookup {
                Ok(Ok(info)) => {
                    let checked = version.with_latest_version(info.version.clone());
                    if checked.is_ahead_of_latest() {
                        warn!(
                            "{}/{}: current {} is ahead of latest {}",
                            service.id,
                            platform,
                            checked.current(),
                            info.version
                        );
                    }
                    VersionCheckResult::success(
                        &service.id,
                        &service.name,
                        platform.clone(),
                        version.current().clone(),
                        info.version,
                        checked.status(),
                        Utc::now(),
                    )
                    .with_changelog(info.changelog)
                    .with_breaking_changes(info.breaking_changes)
                }
                Ok(Err(failure)) => {
                    warn!("Check failed for {}/{}: {}", service.id, platform, failure);
                    VersionCheckResult::failure(
                        &service.id,
                        &service.name,
                        platform.clone(),
                        version.current().clone(),
                        Utc::now(),
                        failure.to_string(),
                    )
                }
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!("Source for {}/{} panicked: {}", service.id, platform, message);
                    VersionCheckResult::failure(
                        &service.id,
                        &service.name,
                        platform.clone(),
                        version.current().clone(),
                        Utc::now(),
                        format!("Source panicked: {}", message),
                    )
                }
            };
            rows.push(row);
        }

        Some(rows)
    }
}
