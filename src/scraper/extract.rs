//! Version extraction from a fetched document

use regex::Regex;
use thiserror::Error;

use crate::error::{ScrapingFailureKind, VersionError};
use crate::scraper::config::{Locator, SourceConfig};
use crate::version::semver::SemanticVersion;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    #[error("locator found nothing: {0}")]
    NotLocated(String),

    #[error("no version-shaped text in '{0}'")]
    NoVersion(String),

    #[error(transparent)]
    Invalid(#[from] VersionError),
}

impl ExtractError {
    pub fn kind(&self) -> ScrapingFailureKind {
        match self {
            ExtractError::NotLocated(_) | ExtractError::NoVersion(_) => {
                ScrapingFailureKind::NoMatch
            }
            ExtractError::Invalid(_) => ScrapingFailureKind::InvalidVersion,
        }
    }
}

#[derive(Debug)]
enum CompiledLocator {
    Document,
    Regex(Regex),
    JsonPointer(String),
}

/// Locator and version pattern compiled once per source
#[derive(Debug)]
pub struct Extractor {
    locator: CompiledLocator,
    pattern: Regex,
}

/// Version found in a document together with the text it came from
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted {
    pub version: SemanticVersion,
    pub raw: String,
}

impl Extractor {
    pub fn compile(source: &SourceConfig) -> Result<Self, regex::Error> {
        let locator = match &source.locator {
            Locator::Document => CompiledLocator::Document,
            Locator::Regex { expr } => CompiledLocator::Regex(Regex::new(expr)?),
            Locator::JsonPointer { pointer } => CompiledLocator::JsonPointer(pointer.clone()),
        };

        Ok(Self {
            locator,
            pattern: Regex::new(source.pattern())?,
        })
    }

    /// Locate the version text in `body`, then pull the first pattern match
    /// out of it and parse it.
    pub fn extract(&self, body: &str) -> Result<Extracted, ExtractError> {
        let located = self.locate(body)?;

        let raw = self
            .pattern
            .find(&located)
            .map(|m| m.as_str().to_string())
            .ok_or_else(|| ExtractError::NoVersion(truncate(&located)))?;

        let version = SemanticVersion::parse(&raw)?;
        Ok(Extracted { version, raw })
    }

    fn locate(&self, body: &str) -> Result<String, ExtractError> {
        match &self.locator {
            CompiledLocator::Document => Ok(body.to_string()),
            CompiledLocator::Regex(re) => {
                let captures = re
                    .captures(body)
                    .ok_or_else(|| ExtractError::NotLocated(format!("/{}/", re.as_str())))?;
                let matched = captures.get(1).or_else(|| captures.get(0));
                Ok(matched.map(|m| m.as_str().to_string()).unwrap_or_default())
            }
            CompiledLocator::JsonPointer(pointer) => {
                let value: serde_json::Value = serde_json::from_str(body).map_err(|e| {
                    ExtractError::NotLocated(format!("body is not JSON ({})", e))
                })?;
                match value.pointer(pointer) {
                    Some(serde_json::Value::String(s)) => Ok(s.clone()),
                    Some(serde_json::Value::Number(n)) => Ok(n.to_string()),
                    Some(_) => Err(ExtractError::NotLocated(format!(
                        "{} is not a string",
                        pointer
                    ))),
                    None => Err(ExtractError::NotLocated(pointer.clone())),
                }
            }
        }
    }
}

fn truncate(text: &str) -> String {
    const MAX: usize = 80;
    match text.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
