//! Per-row results of a version check run

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::service::platform::Platform;
use crate::service::platform_version::ReleaseMetadata;
use crate::service::service::Service;
use crate::version::semver::SemanticVersion;
use crate::version::status::DriftStatus;

/// Outcome of checking one (service, platform) pair.
///
/// A row with `error` set failed on its own; sibling rows are unaffected.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheckResult {
    pub service_id: String,
    pub service_name: String,
    pub platform: Platform,
    pub previous_version: SemanticVersion,
    pub latest_version: Option<SemanticVersion>,
    pub status: DriftStatus,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breaking_changes: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VersionCheckResult {
    pub fn success(
        service_id: &str,
        service_name: &str,
        platform: Platform,
        previous_version: SemanticVersion,
        latest_version: SemanticVersion,
        status: DriftStatus,
        checked_at: DateTime<Utc>,
    ) -> Self {
        Self {
            service_id: service_id.to_string(),
            service_name: service_name.to_string(),
            platform,
            previous_version,
            latest_version: Some(latest_version),
            status,
            checked_at,
            changelog: None,
            breaking_changes: Vec::new(),
            error: None,
        }
    }

    /// A failed row: status `unknown`, no latest version
    pub fn failure(
        service_id: &str,
        service_name: &str,
        platform: Platform,
        previous_version: SemanticVersion,
        checked_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            service_id: service_id.to_string(),
            service_name: service_name.to_string(),
            platform,
            previous_version,
            latest_version: None,
            status: DriftStatus::Unknown,
            checked_at,
            changelog: None,
            breaking_changes: Vec::new(),
            error: Some(error.into()),
        }
    }

    pub fn with_changelog(self, changelog: Option<String>) -> Self {
        Self { changelog, ..self }
    }

    pub fn with_breaking_changes(self, breaking_changes: Vec<String>) -> Self {
        Self {
            breaking_changes,
            ..self
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

/// Aggregate counts over a set of check rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckSummary {
    pub total_checked: usize,
    pub services_checked: usize,
    pub updates_available: usize,
    pub critical_updates: usize,
    pub errors: usize,
}

impl CheckSummary {
    pub fn from_results(results: &[VersionCheckResult]) -> Self {
        let mut services: Vec<&str> = results.iter().map(|r| r.service_id.as_str()).collect();
        services.sort_unstable();
        services.dedup();

        Self {
            total_checked: results.len(),
            services_checked: services.len(),
            updates_available: results.iter().filter(|r| r.status.needs_update()).count(),
            critical_updates: results
                .iter()
                .filter(|r| r.status == DriftStatus::Critical)
                .count(),
            errors: results.iter().filter(|r| r.is_error()).count(),
        }
    }
}

/// Fold the successful rows for `service` into a new Service value.
///
/// Failed rows and rows for platforms the service no longer has are
/// skipped. Returns `None` when nothing applies.
pub fn apply_check_results(
    service: &Service,
    results: &[VersionCheckResult],
    now: DateTime<Utc>,
) -> Option<Service> {
    let updated: Vec<_> = results
        .iter()
        .filter(|row| row.service_id == service.id && !row.is_error())
        .filter_map(|row| {
            let latest = row.latest_version.clone()?;
            let existing = service.platform(&row.platform)?;
            let metadata = ReleaseMetadata {
                // a source without a changelog link keeps the stored one
                changelog: row
                    .changelog
                    .clone()
                    .or_else(|| existing.metadata().changelog.clone()),
                breaking_changes: row.breaking_changes.clone(),
                ..existing.metadata().clone()
            };
            Some(
                existing
                    .with_latest_version(latest)
                    .with_metadata(metadata)
                    .with_last_checked(row.checked_at),
            )
        })
        .collect();

    if updated.is_empty() {
        return None;
    }

    Some(
        service
            .with_updated_versions(updated, now)
            .with_last_checked(now),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::platform_version::PlatformVersion;

    fn v(s: &str) -> SemanticVersion {
        SemanticVersion::parse(s).unwrap()
    }

    fn row(service: &str, status: DriftStatus) -> VersionCheckResult {
        VersionCheckResult::success(
            service,
            service,
            Platform::Web,
            v("1.0.0"),
            v("1.0.0"),
            status,
            Utc::now(),
        )
    }

    #[test]
    fn summary_counts_rows_services_and_statuses() {
        let results = vec![
            row("a", DriftStatus::Current),
            row("a", DriftStatus::Critical),
            row("b", DriftStatus::Warning),
            VersionCheckResult::failure("c", "C", Platform::Ios, v("2.0.0"), Utc::now(), "boom"),
        ];

        assert_eq!(
            CheckSummary::from_results(&results),
            CheckSummary {
                total_checked: 4,
                services_checked: 3,
                updates_available: 2,
                critical_updates: 1,
                errors: 1,
            }
        );
    }

    #[test]
    fn summary_of_no_rows_is_zero() {
        assert_eq!(CheckSummary::from_results(&[]), CheckSummary::default());
    }

    #[test]
    fn apply_check_results_updates_only_successful_rows() {
        let now = Utc::now();
        let service = Service::new("maps", "Maps", "location", now)
            .with_platform(PlatformVersion::new(Platform::Web, v("3.0.0")))
            .with_platform(PlatformVersion::new(Platform::Ios, v("5.0.0")));
        let results = vec![
            VersionCheckResult::success(
                "maps",
                "Maps",
                Platform::Web,
                v("3.0.0"),
                v("3.2.0"),
                DriftStatus::Warning,
                now,
            )
            .with_changelog(Some("https://example.com/changes".to_string())),
            VersionCheckResult::failure("maps", "Maps", Platform::Ios, v("5.0.0"), now, "timeout"),
            VersionCheckResult::success(
                "other",
                "Other",
                Platform::Ios,
                v("1.0.0"),
                v("9.0.0"),
                DriftStatus::Critical,
                now,
            ),
        ];

        let updated = apply_check_results(&service, &results, now).unwrap();

        let web = updated.platform(&Platform::Web).unwrap();
        assert_eq!(web.latest(), Some(&v("3.2.0")));
        assert_eq!(web.status(), DriftStatus::Warning);
        assert_eq!(
            web.metadata().changelog.as_deref(),
            Some("https://example.com/changes")
        );
        assert_eq!(web.last_checked(), Some(now));

        let ios = updated.platform(&Platform::Ios).unwrap();
        assert_eq!(ios.latest(), None);
        assert_eq!(ios.status(), DriftStatus::Unknown);
        assert_eq!(updated.last_checked, Some(now));
    }

    #[test]
    fn apply_check_results_keeps_stored_changelog_when_row_has_none() {
        let now = Utc::now();
        let stored = PlatformVersion::new(Platform::Android, v("2.0.0")).with_metadata(
            ReleaseMetadata {
                changelog: Some("https://example.com/android/changelog".to_string()),
                ..Default::default()
            },
        );
        let service = Service::new("push", "Push", "messaging", now)
            .with_platform(stored)
            .with_platform(PlatformVersion::new(Platform::Web, v("1.0.0")).with_metadata(
                ReleaseMetadata {
                    changelog: Some("https://example.com/web/old".to_string()),
                    ..Default::default()
                },
            ));
        let results = vec![
            VersionCheckResult::success(
                "push",
                "Push",
                Platform::Android,
                v("2.0.0"),
                v("2.1.0"),
                DriftStatus::Warning,
                now,
            ),
            VersionCheckResult::success(
                "push",
                "Push",
                Platform::Web,
                v("1.0.0"),
                v("1.0.1"),
                DriftStatus::Current,
                now,
            )
            .with_changelog(Some("https://example.com/web/new".to_string())),
        ];

        let updated = apply_check_results(&service, &results, now).unwrap();

        let android = updated.platform(&Platform::Android).unwrap();
        assert_eq!(android.latest(), Some(&v("2.1.0")));
        assert_eq!(
            android.metadata().changelog.as_deref(),
            Some("https://example.com/android/changelog")
        );
        let web = updated.platform(&Platform::Web).unwrap();
        assert_eq!(
            web.metadata().changelog.as_deref(),
            Some("https://example.com/web/new")
        );
    }

    #[test]
    fn apply_check_results_without_successes_is_none() {
        let now = Utc::now();
        let service = Service::new("maps", "Maps", "location", now)
            .with_platform(PlatformVersion::new(Platform::Web, v("3.0.0")));
        let results = vec![VersionCheckResult::failure(
            "maps",
            "Maps",
            Platform::Web,
            v("3.0.0"),
            now,
            "HTTP 503",
        )];

        assert_eq!(apply_check_results(&service, &results, now), None);
    }

    #[test]
    fn failure_row_is_unknown_without_latest() {
        let failed =
            VersionCheckResult::failure("s", "S", Platform::Android, v("3.1.0"), Utc::now(), "timeout");
        assert_eq!(failed.status, DriftStatus::Unknown);
        assert_eq!(failed.latest_version, None);
        assert!(failed.is_error());

        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["error"], "timeout");
        assert_eq!(json["previousVersion"], "3.1.0");
    }
}
