//! Error types for version parsing, scraping, storage and the use-case layer
//!
//! Error hierarchy:
//! - VersionError: malformed version strings
//! - ScrapingFailure: one failed (service, platform) lookup, isolated to its row
//! - StoreError: backing document store failures, including revision conflicts
//! - ConfigError: invalid configuration or scraper rules
//! - AppError: use-case taxonomy surfaced through the response envelope

use std::any::Any;
use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("Invalid version: '{input}'")]
    Invalid { input: String },
}

impl VersionError {
    pub fn invalid(input: impl Into<String>) -> Self {
        VersionError::Invalid {
            input: input.into(),
        }
    }
}

/// What went wrong while scraping a remote version source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrapingFailureKind {
    /// Connection, TLS or body read failure
    Transport,
    /// No response within the scraper timeout
    Timeout,
    /// Non-2xx response status
    Status(u16),
    /// Locator or pattern found nothing in the document
    NoMatch,
    /// Extracted text is not a semantic version
    InvalidVersion,
    /// The scraper has no source configured for the platform
    NotConfigured,
}

impl ScrapingFailureKind {
    /// Only transport-level failures are worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ScrapingFailureKind::Transport
                | ScrapingFailureKind::Timeout
                | ScrapingFailureKind::Status(_)
        )
    }
}

impl fmt::Display for ScrapingFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScrapingFailureKind::Transport => write!(f, "transport"),
            ScrapingFailureKind::Timeout => write!(f, "timeout"),
            ScrapingFailureKind::Status(code) => write!(f, "HTTP {}", code),
            ScrapingFailureKind::NoMatch => write!(f, "no match"),
            ScrapingFailureKind::InvalidVersion => write!(f, "invalid version"),
            ScrapingFailureKind::NotConfigured => write!(f, "not configured"),
        }
    }
}

/// A failed lookup of the latest version for one (service, platform) pair
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Scraping failed for {url} ({kind}): {message}")]
pub struct ScrapingFailure {
    pub url: String,
    pub kind: ScrapingFailureKind,
    pub message: String,
}

impl ScrapingFailure {
    pub fn new(
        url: impl Into<String>,
        kind: ScrapingFailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            kind,
            message: message.into(),
        }
    }

    /// Classify a reqwest error as a timeout or a transport failure
    pub fn from_reqwest(url: &str, error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() {
            ScrapingFailureKind::Timeout
        } else {
            ScrapingFailureKind::Transport
        };
        Self::new(url, kind, error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Revision conflict: document changed since revision '{expected}'")]
    Conflict { expected: String },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Corrupt document: {0}")]
    Corrupt(String),

    #[error("Failed to acquire store lock")]
    LockPoisoned,
}

impl StoreError {
    pub fn conflict(expected: impl Into<String>) -> Self {
        StoreError::Conflict {
            expected: expected.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid pattern for {service_id}/{platform}: {source}")]
    InvalidPattern {
        service_id: String,
        platform: String,
        #[source]
        source: regex::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Failed to open store: {0}")]
    Store(#[from] StoreError),

    #[error("Environment variable {0} is not set")]
    MissingEnv(String),
}

/// Machine-readable error code carried in the response envelope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    NotFound,
    Conflict,
    AlreadyExists,
    ScrapingFailed,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "VALIDATION_ERROR",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::AlreadyExists => "ALREADY_EXISTS",
            ErrorCode::ScrapingFailed => "SCRAPING_FAILED",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// Use-case level error
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation failed: {message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: String },

    #[error("Conflicting write: {0}")]
    Conflict(String),

    #[error("{entity} already exists: {key}")]
    AlreadyExists { entity: &'static str, key: String },

    #[error(transparent)]
    Scraping(#[from] ScrapingFailure),

    #[error(transparent)]
    Store(StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn validation_with(message: impl Into<String>, details: serde_json::Value) -> Self {
        AppError::Validation {
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        AppError::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn already_exists(entity: &'static str, key: impl Into<String>) -> Self {
        AppError::AlreadyExists {
            entity,
            key: key.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation { .. } => ErrorCode::ValidationError,
            AppError::NotFound { .. } => ErrorCode::NotFound,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::AlreadyExists { .. } => ErrorCode::AlreadyExists,
            AppError::Scraping(_) => ErrorCode::ScrapingFailed,
            AppError::Store(_) | AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Conflicts are the only errors a caller should re-read and resubmit on
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Conflict(_))
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            AppError::Validation { details, .. } => details.clone(),
            AppError::Scraping(failure) => Some(serde_json::json!({
                "url": failure.url,
                "kind": failure.kind.to_string(),
            })),
            _ => None,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Conflict { .. } => AppError::Conflict(error.to_string()),
            other => AppError::Store(other),
        }
    }
}

impl From<VersionError> for AppError {
    fn from(error: VersionError) -> Self {
        AppError::validation(error.to_string())
    }
}

/// Text of a caught panic payload
pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panicked".to_string()
    }
}
