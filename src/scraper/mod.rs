//! Latest-version sources
//!
//! # Modules
//!
//! - [`config`]: declarative per-service scraper records
//! - [`extract`]: locator + pattern extraction from a fetched body
//! - [`rate_limit`]: per-instance request spacing
//! - [`http`]: [`HttpScraper`], the single configurable implementation

pub mod config;
pub mod extract;
pub mod http;
pub mod rate_limit;

#[cfg(test)]
use mockall::automock;

use chrono::{DateTime, Utc};

use crate::error::ScrapingFailure;
use crate::service::platform::Platform;
use crate::version::semver::SemanticVersion;

pub use config::{Locator, ScraperConfig, SourceConfig};
pub use http::HttpScraper;

/// Latest version found for one platform of a service
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedVersionInfo {
    pub platform: Platform,
    pub version: SemanticVersion,
    /// Matched text before parsing
    pub raw: String,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
    pub changelog: Option<String>,
    pub breaking_changes: Vec<String>,
}

impl ScrapedVersionInfo {
    pub fn new(
        platform: Platform,
        version: SemanticVersion,
        source_url: impl Into<String>,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        Self {
            raw: version.to_string(),
            platform,
            version,
            source_url: source_url.into(),
            fetched_at,
            changelog: None,
            breaking_changes: Vec::new(),
        }
    }
}

/// Looks up the latest published version of one service, per platform
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait VersionSource: Send + Sync {
    /// Id of the service this source answers for
    fn service_id(&self) -> &str;

    /// Fetch (or serve from cache) the latest version for `platform`
    async fn scrape_latest(&self, platform: &Platform)
    -> Result<ScrapedVersionInfo, ScrapingFailure>;

    /// Drop cached results so the next call goes to the network
    fn clear_cache(&self);
}
