//! Drift classification between the version in use and the latest available

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::version::semver::SemanticVersion;

/// Major version gap at which drift becomes critical
const CRITICAL_MAJOR_GAP: u64 = 2;

/// Minor version gap (within the same major) at which drift becomes outdated
const OUTDATED_MINOR_GAP: u64 = 5;

/// Severity of the drift between a current and a latest version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriftStatus {
    /// Up to date, ahead of latest, or behind by patch releases only
    Current,
    /// Behind by 1-4 minor releases
    Warning,
    /// Behind by one major release, or 5+ minor releases
    Outdated,
    /// Behind by two or more major releases
    Critical,
    /// Latest version is not known
    Unknown,
}

impl DriftStatus {
    pub const ALL: [DriftStatus; 5] = [
        DriftStatus::Current,
        DriftStatus::Warning,
        DriftStatus::Outdated,
        DriftStatus::Critical,
        DriftStatus::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DriftStatus::Current => "current",
            DriftStatus::Warning => "warning",
            DriftStatus::Outdated => "outdated",
            DriftStatus::Critical => "critical",
            DriftStatus::Unknown => "unknown",
        }
    }

    /// Rank used for "most critical wins" reduction; `Unknown` ranks lowest
    fn priority(&self) -> u8 {
        match self {
            DriftStatus::Unknown => 0,
            DriftStatus::Current => 1,
            DriftStatus::Warning => 2,
            DriftStatus::Outdated => 3,
            DriftStatus::Critical => 4,
        }
    }

    pub fn needs_update(&self) -> bool {
        matches!(
            self,
            DriftStatus::Warning | DriftStatus::Outdated | DriftStatus::Critical
        )
    }

    /// Reduce a set of statuses to the most critical one.
    ///
    /// `Unknown` only wins when it is the sole status present; an empty
    /// set is `Unknown`.
    pub fn most_critical<I>(statuses: I) -> DriftStatus
    where
        I: IntoIterator<Item = DriftStatus>,
    {
        statuses.into_iter().max().unwrap_or(DriftStatus::Unknown)
    }
}

impl Ord for DriftStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority().cmp(&other.priority())
    }
}

impl PartialOrd for DriftStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DriftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DriftStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

/// Classify the drift between `current` and `latest`.
///
/// A current version ahead of latest is reported as `Current`; callers
/// that care can detect it with [`is_ahead`].
pub fn classify(current: &SemanticVersion, latest: Option<&SemanticVersion>) -> DriftStatus {
    let Some(latest) = latest else {
        return DriftStatus::Unknown;
    };

    if current >= latest {
        return DriftStatus::Current;
    }

    let major_gap = latest.major().saturating_sub(current.major());
    if major_gap >= CRITICAL_MAJOR_GAP {
        return DriftStatus::Critical;
    }
    if major_gap == 1 {
        return DriftStatus::Outdated;
    }

    match latest.minor().saturating_sub(current.minor()) {
        0 => DriftStatus::Current,
        gap if gap >= OUTDATED_MINOR_GAP => DriftStatus::Outdated,
        _ => DriftStatus::Warning,
    }
}

/// True when the version in use is strictly newer than the latest known one
pub fn is_ahead(current: &SemanticVersion, latest: Option<&SemanticVersion>) -> bool {
    latest.is_some_and(|latest| current > latest)
}
