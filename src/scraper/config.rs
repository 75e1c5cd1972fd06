//! Declarative scraper configuration
//!
//! One record per service; each platform names a document URL, where to
//! look inside it, and which version-shaped pattern to pull out.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::service::platform::Platform;

/// Default timeout for one HTTP request (10 seconds)
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default total attempts per scrape
pub const DEFAULT_RETRIES: u32 = 3;

/// Default minimum spacing between requests of one scraper (1 second)
pub const DEFAULT_RATE_LIMIT_MS: u64 = 1_000;

/// Default lifetime of a scraped result (1 hour)
pub const DEFAULT_CACHE_TTL_MS: u64 = 60 * 60 * 1000;

/// Version-shaped text: `MAJOR.MINOR.PATCH[-pre][+build]`.
///
/// Suffixes are dot-separated identifiers, so a sentence-ending period is
/// never part of the match.
pub const DEFAULT_VERSION_PATTERN: &str = r"\d+\.\d+\.\d+(?:-[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?(?:\+[0-9A-Za-z-]+(?:\.[0-9A-Za-z-]+)*)?";

/// Where the version text lives inside the fetched document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Locator {
    /// The whole response body
    #[default]
    Document,
    /// First regex match; capture group 1 when present, else the whole match
    Regex { expr: String },
    /// A JSON pointer (RFC 6901) into a JSON body, e.g. `/info/version`
    JsonPointer { pointer: String },
}

/// Source of the latest version for one platform
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceConfig {
    pub url: String,
    #[serde(default)]
    pub locator: Locator,
    /// Overrides [`DEFAULT_VERSION_PATTERN`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog_url: Option<String>,
}

impl SourceConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            locator: Locator::Document,
            pattern: None,
            changelog_url: None,
        }
    }

    pub fn with_locator(self, locator: Locator) -> Self {
        Self { locator, ..self }
    }

    pub fn with_pattern(self, pattern: impl Into<String>) -> Self {
        Self {
            pattern: Some(pattern.into()),
            ..self
        }
    }

    pub fn with_changelog_url(self, url: impl Into<String>) -> Self {
        Self {
            changelog_url: Some(url.into()),
            ..self
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_deref().unwrap_or(DEFAULT_VERSION_PATTERN)
    }
}

/// Scraper settings for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScraperConfig {
    pub service_id: String,
    pub sources: IndexMap<Platform, SourceConfig>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Total attempts, including the first
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_rate_limit_ms")]
    pub rate_limit_ms: u64,
    #[serde(default = "default_cache_ttl_ms")]
    pub cache_ttl_ms: u64,
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_retries() -> u32 {
    DEFAULT_RETRIES
}

fn default_rate_limit_ms() -> u64 {
    DEFAULT_RATE_LIMIT_MS
}

fn default_cache_ttl_ms() -> u64 {
    DEFAULT_CACHE_TTL_MS
}

impl ScraperConfig {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            sources: IndexMap::new(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            retries: DEFAULT_RETRIES,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
        }
    }

    pub fn with_source(mut self, platform: Platform, source: SourceConfig) -> Self {
        self.sources.insert(platform, source);
        self
    }

    pub fn with_timeout_ms(self, timeout_ms: u64) -> Self {
        Self { timeout_ms, ..self }
    }

    pub fn with_retries(self, retries: u32) -> Self {
        Self { retries, ..self }
    }

    pub fn with_rate_limit_ms(self, rate_limit_ms: u64) -> Self {
        Self {
            rate_limit_ms,
            ..self
        }
    }

    pub fn with_cache_ttl_ms(self, cache_ttl_ms: u64) -> Self {
        Self {
            cache_ttl_ms,
            ..self
        }
    }
}
