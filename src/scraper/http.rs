//! HTTP document scraper driven by a [`ScraperConfig`]

use std::time::Duration;

use chrono::Utc;
use indexmap::IndexMap;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::cache::TtlCache;
use crate::config::USER_AGENT;
use crate::error::{ConfigError, ScrapingFailure, ScrapingFailureKind};
use crate::scraper::config::{ScraperConfig, SourceConfig};
use crate::scraper::extract::Extractor;
use crate::scraper::rate_limit::RateLimiter;
use crate::scraper::{ScrapedVersionInfo, VersionSource};
use crate::service::platform::Platform;

struct CompiledSource {
    config: SourceConfig,
    extractor: Extractor,
}

pub struct HttpScraper {
    service_id: String,
    client: reqwest::Client,
    sources: IndexMap<Platform, CompiledSource>,
    attempts: u32,
    rate_limit: Duration,
    limiter: RateLimiter,
    cache: TtlCache<Platform, ScrapedVersionInfo>,
}

impl HttpScraper {
    /// Build a scraper, compiling every locator and pattern up front
    pub fn new(config: &ScraperConfig) -> Result<Self, ConfigError> {
        let sources = config
            .sources
            .iter()
            .map(|(platform, source)| {
                let extractor =
                    Extractor::compile(source).map_err(|e| ConfigError::InvalidPattern {
                        service_id: config.service_id.clone(),
                        platform: platform.to_string(),
                        source: e,
                    })?;
                Ok((
                    platform.clone(),
                    CompiledSource {
                        config: source.clone(),
                        extractor,
                    },
                ))
            })
            .collect::<Result<IndexMap<_, _>, ConfigError>>()?;

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let rate_limit = Duration::from_millis(config.rate_limit_ms);

        Ok(Self {
            service_id: config.service_id.clone(),
            client,
            sources,
            attempts: config.retries.max(1),
            rate_limit,
            limiter: RateLimiter::new(rate_limit),
            cache: TtlCache::new(Duration::from_millis(config.cache_ttl_ms)),
        })
    }

    /// One rate-limited GET; returns the body of a 2xx response
    async fn fetch(&self, url: &str) -> Result<String, ScrapingFailure> {
        self.limiter.acquire().await;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapingFailure::from_reqwest(url, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScrapingFailure::new(
                url,
                ScrapingFailureKind::Status(status.as_u16()),
                format!("Unexpected status: {}", status),
            ));
        }

        response
            .text()
            .await
            .map_err(|e| ScrapingFailure::from_reqwest(url, &e))
    }

    /// GET with retries on transport-level failures; attempt `n` that fails
    /// is followed by a `rate_limit * n` backoff.
    async fn fetch_with_retry(&self, url: &str) -> Result<String, ScrapingFailure> {
        let mut attempt = 1;
        loop {
            match self.fetch(url).await {
                Ok(body) => return Ok(body),
                Err(failure) if failure.kind.is_retryable() && attempt < self.attempts => {
                    let backoff = self.rate_limit * attempt;
                    debug!(
                        "Attempt {}/{} for {} failed ({}), retrying in {:?}",
                        attempt, self.attempts, url, failure.kind, backoff
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

#[async_trait::async_trait]
impl VersionSource for HttpScraper {
    fn service_id(&self) -> &str {
        &self.service_id
    }

    async fn scrape_latest(
        &self,
        platform: &Platform,
    ) -> Result<ScrapedVersionInfo, ScrapingFailure> {
        let Some(source) = self.sources.get(platform) else {
            return Err(ScrapingFailure::new(
                "",
                ScrapingFailureKind::NotConfigured,
                format!("{} has no source for {}", self.service_id, platform),
            ));
        };

        if let Some(cached) = self.cache.get(platform) {
            debug!("Cache hit for {}/{}", self.service_id, platform);
            return Ok(cached);
        }

        let url = source.config.url.as_str();
        let body = self
            .fetch_with_retry(url)
            .await
            .inspect_err(|e| warn!("{}/{}: {}", self.service_id, platform, e))?;

        let extracted = source
            .extractor
            .extract(&body)
            .map_err(|e| ScrapingFailure::new(url, e.kind(), e.to_string()))
            .inspect_err(|e| warn!("{}/{}: {}", self.service_id, platform, e))?;

        debug!(
            "Scraped {}/{}: {} from {}",
            self.service_id, platform, extracted.version, url
        );

        let info = ScrapedVersionInfo {
            raw: extracted.raw,
            changelog: source.config.changelog_url.clone(),
            ..ScrapedVersionInfo::new(platform.clone(), extracted.version, url, Utc::now())
        };
        self.cache.insert(platform.clone(), info.clone());

        Ok(info)
    }

    fn clear_cache(&self) {
        self.cache.clear();
    }
}
