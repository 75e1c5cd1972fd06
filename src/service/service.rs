//! Monitored service aggregate

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::service::platform::Platform;
use crate::service::platform_version::PlatformVersion;
use crate::version::status::DriftStatus;

/// A third-party SDK or service tracked across client platforms.
///
/// Mutations return a new value; platforms keep the order in which they
/// were configured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", into = "ServiceRecord", from = "ServiceRecord")]
pub struct Service {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub documentation_url: String,
    pub logo_url: Option<String>,
    platforms: IndexMap<Platform, PlatformVersion>,
    pub last_checked: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Stored document shape: platforms as a list of self-describing records
#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServiceRecord {
    id: String,
    name: String,
    category: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    documentation_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    logo_url: Option<String>,
    #[serde(default)]
    platforms: Vec<PlatformVersion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_checked: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ServiceRecord> for Service {
    fn from(record: ServiceRecord) -> Self {
        Service {
            id: record.id,
            name: record.name,
            category: record.category,
            description: record.description,
            documentation_url: record.documentation_url,
            logo_url: record.logo_url,
            platforms: record
                .platforms
                .into_iter()
                .map(|pv| (pv.platform().clone(), pv))
                .collect(),
            last_checked: record.last_checked,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

impl From<Service> for ServiceRecord {
    fn from(service: Service) -> Self {
        ServiceRecord {
            id: service.id,
            name: service.name,
            category: service.category,
            description: service.description,
            documentation_url: service.documentation_url,
            logo_url: service.logo_url,
            platforms: service.platforms.into_values().collect(),
            last_checked: service.last_checked,
            created_at: service.created_at,
            updated_at: service.updated_at,
        }
    }
}

/// Partial update of a service's identity fields and platform entries
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub documentation_url: Option<String>,
    pub logo_url: Option<String>,
    /// Full replacement of the listed platform entries
    pub platforms: Vec<PlatformVersion>,
}

impl ServicePatch {
    pub fn is_empty(&self) -> bool {
        *self == ServicePatch::default()
    }
}

impl Service {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        category: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            category: category.into(),
            description: String::new(),
            documentation_url: String::new(),
            logo_url: None,
            platforms: IndexMap::new(),
            last_checked: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(self, description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            ..self
        }
    }

    pub fn with_documentation_url(self, url: impl Into<String>) -> Self {
        Self {
            documentation_url: url.into(),
            ..self
        }
    }

    pub fn with_logo_url(self, url: impl Into<String>) -> Self {
        Self {
            logo_url: Some(url.into()),
            ..self
        }
    }

    /// Add or replace one platform entry while building a service
    pub fn with_platform(mut self, version: PlatformVersion) -> Self {
        self.platforms.insert(version.platform().clone(), version);
        self
    }

    pub fn platforms(&self) -> impl Iterator<Item = &PlatformVersion> {
        self.platforms.values()
    }

    pub fn platform(&self, platform: &Platform) -> Option<&PlatformVersion> {
        self.platforms.get(platform)
    }

    pub fn platform_tags(&self) -> Vec<Platform> {
        self.platforms.keys().cloned().collect()
    }

    pub fn has_platform(&self, platform: &Platform) -> bool {
        self.platforms.contains_key(platform)
    }

    pub fn platform_count(&self) -> usize {
        self.platforms.len()
    }

    /// Most critical status across all configured platforms
    pub fn overall_status(&self) -> DriftStatus {
        DriftStatus::most_critical(self.platforms.values().map(PlatformVersion::status))
    }

    /// Most critical status across the given platforms that are configured
    pub fn status_for(&self, platforms: &[Platform]) -> DriftStatus {
        DriftStatus::most_critical(
            platforms
                .iter()
                .filter_map(|p| self.platforms.get(p))
                .map(PlatformVersion::status),
        )
    }

    pub fn has_updates_available(&self) -> bool {
        self.platforms.values().any(PlatformVersion::has_update)
    }

    /// Replace the given platform entries wholesale, keeping their position
    pub fn with_updated_versions<I>(&self, versions: I, now: DateTime<Utc>) -> Service
    where
        I: IntoIterator<Item = PlatformVersion>,
    {
        let mut updated = self.clone();
        for version in versions {
            updated.platforms.insert(version.platform().clone(), version);
        }
        updated.updated_at = now;
        updated
    }

    pub fn with_last_checked(&self, at: DateTime<Utc>) -> Service {
        Service {
            last_checked: Some(at),
            ..self.clone()
        }
    }

    /// Apply a partial update; identity is kept, `updated_at` is bumped
    pub fn with_patch(&self, patch: ServicePatch, now: DateTime<Utc>) -> Service {
        let mut updated = self.with_updated_versions(patch.platforms, now);
        if let Some(name) = patch.name {
            updated.name = name;
        }
        if let Some(category) = patch.category {
            updated.category = category;
        }
        if let Some(description) = patch.description {
            updated.description = description;
        }
        if let Some(url) = patch.documentation_url {
            updated.documentation_url = url;
        }
        if let Some(url) = patch.logo_url {
            updated.logo_url = Some(url);
        }
        updated
    }
}

/// Derive a stable id from a display name: lowercase, runs of
/// non-alphanumerics collapsed to a single `-`
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
