//! Service x platform comparison matrix and derived insights

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::Serialize;
use serde_json::json;
use tracing::warn;

use crate::error::AppError;
use crate::service::platform::Platform;
use crate::service::service::Service;
use crate::version::status::DriftStatus;

pub const MIN_COMPARE_SERVICES: usize = 2;
pub const MAX_COMPARE_SERVICES: usize = 4;

/// Cell text for a platform the service does not configure
pub const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonCell {
    pub service_id: String,
    pub service_name: String,
    pub current: String,
    pub latest: String,
    pub status: DriftStatus,
}

/// One platform across the compared services
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparisonRow {
    pub platform: Platform,
    pub cells: Vec<ComparisonCell>,
    /// More than one distinct current version among configured cells
    pub has_discrepancies: bool,
}

impl ComparisonRow {
    /// Distinct configured current versions, in first-seen order
    pub fn distinct_versions(&self) -> Vec<&str> {
        self.cells
            .iter()
            .map(|cell| cell.current.as_str())
            .filter(|current| *current != NOT_AVAILABLE)
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InsightKind {
    UpdatesNeeded,
    Discrepancy,
    CriticalServices,
    AllCurrent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insight {
    pub kind: InsightKind,
    pub severity: Severity,
    pub message: String,
    /// Ids of the services the insight is about
    pub services: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComparedService {
    pub id: String,
    pub name: String,
    /// Most critical status over the compared platforms
    pub status: DriftStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparison {
    pub services: Vec<ComparedService>,
    pub platforms: Vec<Platform>,
    pub rows: Vec<ComparisonRow>,
    pub insights: Vec<Insight>,
    pub generated_at: DateTime<Utc>,
}

/// Compare 2-4 services from `available` on `platforms` (web/ios/android
/// when not given).
///
/// Duplicate ids count once. Ids that do not resolve are dropped with a
/// warning; fewer than two resolved services is a validation error.
pub fn compare_services(
    requested: &[String],
    available: &[Service],
    platforms: Option<&[Platform]>,
    now: DateTime<Utc>,
) -> Result<Comparison, AppError> {
    let ids: IndexSet<&str> = requested.iter().map(String::as_str).collect();

    if !(MIN_COMPARE_SERVICES..=MAX_COMPARE_SERVICES).contains(&ids.len()) {
        return Err(AppError::validation_with(
            format!(
                "Comparison requires {} to {} services, got {}",
                MIN_COMPARE_SERVICES,
                MAX_COMPARE_SERVICES,
                ids.len()
            ),
            json!({ "serviceIds": ids }),
        ));
    }

    let mut resolved = Vec::new();
    let mut missing = Vec::new();
    for id in &ids {
        match available.iter().find(|service| service.id == *id) {
            Some(service) => resolved.push(service),
            None => {
                warn!("Comparison skips unknown service {}", id);
                missing.push(*id);
            }
        }
    }

    if resolved.len() < MIN_COMPARE_SERVICES {
        return Err(AppError::validation_with(
            format!(
                "Comparison requires at least {} existing services, found {}",
                MIN_COMPARE_SERVICES,
                resolved.len()
            ),
            json!({ "notFound": missing }),
        ));
    }

    let platforms: Vec<Platform> = match platforms {
        Some(platforms) if !platforms.is_empty() => platforms
            .iter()
            .cloned()
            .collect::<IndexSet<_>>()
            .into_iter()
            .collect(),
        _ => Platform::defaults(),
    };

    Ok(build_comparison(&resolved, &platforms, now))
}

/// Build the matrix and insights for already-resolved services
pub fn build_comparison(
    services: &[&Service],
    platforms: &[Platform],
    now: DateTime<Utc>,
) -> Comparison {
    let rows: Vec<ComparisonRow> = platforms
        .iter()
        .map(|platform| build_row(services, platform))
        .collect();

    Comparison {
        services: services
            .iter()
            .map(|service| ComparedService {
                id: service.id.clone(),
                name: service.name.clone(),
                status: service.status_for(platforms),
            })
            .collect(),
        platforms: platforms.to_vec(),
        insights: generate_insights(services, platforms, &rows),
        rows,
        generated_at: now,
    }
}

fn build_row(services: &[&Service], platform: &Platform) -> ComparisonRow {
    let cells: Vec<ComparisonCell> = services
        .iter()
        .map(|service| {
            let (current, latest, status) = match service.platform(platform) {
                Some(version) => (
                    version.current().to_string(),
                    version
                        .latest()
                        .map(ToString::to_string)
                        .unwrap_or_else(|| NOT_AVAILABLE.to_string()),
                    version.status(),
                ),
                None => (
                    NOT_AVAILABLE.to_string(),
                    NOT_AVAILABLE.to_string(),
                    DriftStatus::Unknown,
                ),
            };
            ComparisonCell {
                service_id: service.id.clone(),
                service_name: service.name.clone(),
                current,
                latest,
                status,
            }
        })
        .collect();

    let mut row = ComparisonRow {
        platform: platform.clone(),
        cells,
        has_discrepancies: false,
    };
    row.has_discrepancies = row.distinct_versions().len() > 1;
    row
}

fn generate_insights(
    services: &[&Service],
    platforms: &[Platform],
    rows: &[ComparisonRow],
) -> Vec<Insight> {
    let mut insights = Vec::new();

    let statuses: Vec<(&Service, DriftStatus)> = services
        .iter()
        .map(|service| (*service, service.status_for(platforms)))
        .collect();

    let needing_update: Vec<&(&Service, DriftStatus)> = statuses
        .iter()
        .filter(|(_, status)| status.needs_update())
        .collect();
    let critical: Vec<&Service> = statuses
        .iter()
        .filter(|(_, status)| *status == DriftStatus::Critical)
        .map(|(service, _)| *service)
        .collect();

    if !needing_update.is_empty() {
        let message = if critical.is_empty() {
            format!(
                "{} of {} services need updates",
                needing_update.len(),
                services.len()
            )
        } else {
            format!(
                "{} of {} services need updates, {} critical",
                needing_update.len(),
                services.len(),
                critical.len()
            )
        };
        insights.push(Insight {
            kind: InsightKind::UpdatesNeeded,
            severity: if critical.is_empty() {
                Severity::Warning
            } else {
                Severity::Critical
            },
            message,
            services: needing_update
                .iter()
                .map(|(service, _)| service.id.clone())
                .collect(),
        });
    }

    for row in rows.iter().filter(|row| row.has_discrepancies) {
        insights.push(Insight {
            kind: InsightKind::Discrepancy,
            severity: Severity::Info,
            message: format!(
                "Different {} versions in use: {}",
                row.platform,
                row.distinct_versions().join(", ")
            ),
            services: row
                .cells
                .iter()
                .filter(|cell| cell.current != NOT_AVAILABLE)
                .map(|cell| cell.service_id.clone())
                .collect(),
        });
    }

    if !critical.is_empty() {
        insights.push(Insight {
            kind: InsightKind::CriticalServices,
            severity: Severity::Critical,
            message: format!(
                "Critical updates required for {}",
                critical
                    .iter()
                    .map(|service| service.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            services: critical.iter().map(|service| service.id.clone()).collect(),
        });
    }

    let all_current = rows
        .iter()
        .all(|row| row.cells.iter().all(|cell| cell.status == DriftStatus::Current));
    if all_current {
        insights.push(Insight {
            kind: InsightKind::AllCurrent,
            severity: Severity::Info,
            message: format!(
                "All compared services are current on {}",
                platforms
                    .iter()
                    .map(Platform::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            services: services.iter().map(|service| service.id.clone()).collect(),
        });
    }

    insights
}
