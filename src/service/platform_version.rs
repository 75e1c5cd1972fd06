//! Per-platform version record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::service::platform::Platform;
use crate::version::semver::SemanticVersion;
use crate::version::status::{DriftStatus, classify, is_ahead};

/// Release information attached to the latest known version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReleaseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub breaking_changes: Vec<String>,
}

impl ReleaseMetadata {
    pub fn is_empty(&self) -> bool {
        self.release_date.is_none() && self.changelog.is_none() && self.breaking_changes.is_empty()
    }
}

/// Current/latest version pair for one service on one platform.
///
/// `status` is derived from the pair by [`classify`] whenever either side
/// changes and cannot be set directly. A stored status is ignored on
/// deserialization and recomputed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "PlatformVersionRecord")]
pub struct PlatformVersion {
    platform: Platform,
    current: SemanticVersion,
    #[serde(skip_serializing_if = "Option::is_none")]
    latest: Option<SemanticVersion>,
    status: DriftStatus,
    #[serde(skip_serializing_if = "ReleaseMetadata::is_empty")]
    metadata: ReleaseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_checked: Option<DateTime<Utc>>,
}

/// Serialized shape of a PlatformVersion, without the derived status
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlatformVersionRecord {
    platform: Platform,
    current: SemanticVersion,
    #[serde(default)]
    latest: Option<SemanticVersion>,
    #[serde(default)]
    metadata: ReleaseMetadata,
    #[serde(default)]
    last_checked: Option<DateTime<Utc>>,
}

impl From<PlatformVersionRecord> for PlatformVersion {
    fn from(record: PlatformVersionRecord) -> Self {
        PlatformVersion::with_latest(record.platform, record.current, record.latest)
            .with_metadata(record.metadata)
            .with_last_checked_at(record.last_checked)
    }
}

impl PlatformVersion {
    /// A version with no known latest; status is `Unknown`
    pub fn new(platform: Platform, current: SemanticVersion) -> Self {
        Self::with_latest(platform, current, None)
    }

    pub fn with_latest(
        platform: Platform,
        current: SemanticVersion,
        latest: Option<SemanticVersion>,
    ) -> Self {
        let status = classify(&current, latest.as_ref());
        Self {
            platform,
            current,
            latest,
            status,
            metadata: ReleaseMetadata::default(),
            last_checked: None,
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn current(&self) -> &SemanticVersion {
        &self.current
    }

    pub fn latest(&self) -> Option<&SemanticVersion> {
        self.latest.as_ref()
    }

    pub fn status(&self) -> DriftStatus {
        self.status
    }

    pub fn metadata(&self) -> &ReleaseMetadata {
        &self.metadata
    }

    pub fn last_checked(&self) -> Option<DateTime<Utc>> {
        self.last_checked
    }

    pub fn has_update(&self) -> bool {
        self.status.needs_update()
    }

    /// The pinned version is newer than the latest published one
    pub fn is_ahead_of_latest(&self) -> bool {
        is_ahead(&self.current, self.latest.as_ref())
    }

    /// Replace the version in use, keeping latest and metadata
    pub fn with_current(&self, current: SemanticVersion) -> Self {
        Self {
            status: classify(&current, self.latest.as_ref()),
            current,
            ..self.clone()
        }
    }

    /// Replace the latest known version, keeping the version in use
    pub fn with_latest_version(&self, latest: SemanticVersion) -> Self {
        Self {
            status: classify(&self.current, Some(&latest)),
            latest: Some(latest),
            ..self.clone()
        }
    }

    pub fn with_metadata(self, metadata: ReleaseMetadata) -> Self {
        Self { metadata, ..self }
    }

    pub fn with_last_checked(self, at: DateTime<Utc>) -> Self {
        self.with_last_checked_at(Some(at))
    }

    fn with_last_checked_at(self, last_checked: Option<DateTime<Utc>>) -> Self {
        Self {
            last_checked,
            ..self
        }
    }
}
