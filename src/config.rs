use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::scraper::config::ScraperConfig;

// =============================================================================
// Defaults
// =============================================================================

/// Services checked concurrently per batch
pub const DEFAULT_CHECK_CONCURRENCY: usize = 3;

/// Lifetime of the registry read cache in milliseconds (30 seconds)
pub const DEFAULT_READ_CACHE_TTL_MS: u64 = 30_000;

/// Re-read-and-retry attempts for writes that hit a revision conflict
pub const DEFAULT_CONFLICT_RETRIES: u32 = 3;

pub const DEFAULT_GITHUB_API_URL: &str = "https://api.github.com";

/// User agent sent with every outbound request
pub const USER_AGENT: &str = concat!("version-watch/", env!("CARGO_PKG_VERSION"));

/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "VERSION_WATCH_LOG";

/// Application configuration, read from a JSON file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AppConfig {
    pub check: CheckConfig,
    pub store: StoreConfig,
    pub scrapers: Vec<ScraperConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CheckConfig {
    pub concurrency: usize,
}

impl Default for CheckConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CHECK_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Registry read cache lifetime in milliseconds
    pub read_cache_ttl_ms: u64,
    pub conflict_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            read_cache_ttl_ms: DEFAULT_READ_CACHE_TTL_MS,
            conflict_retries: DEFAULT_CONFLICT_RETRIES,
        }
    }
}

/// Which document store backs the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum StoreBackend {
    Memory,
    /// SQLite file; defaults to `<data_dir>/registry.db`
    Sqlite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        path: Option<PathBuf>,
    },
    Github(GithubSettings),
}

impl Default for StoreBackend {
    fn default() -> Self {
        StoreBackend::Sqlite { path: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubSettings {
    pub owner: String,
    pub repo: String,
    /// File path inside the repository
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Name of the environment variable holding the API token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
}

impl AppConfig {
    /// Load configuration from `path`; a missing file yields defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Returns the path to the data directory for version-watch.
/// Uses $XDG_DATA_HOME/version-watch if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/version-watch,
/// or ./version-watch if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the SQLite registry database.
pub fn db_path() -> PathBuf {
    data_dir().join("registry.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("version-watch.log")
}

/// Returns the default configuration file path.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("version-watch")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scraper::config::SourceConfig;
    use crate::service::platform::Platform;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn app_config_from_partial_object_uses_defaults_for_missing_fields() {
        let result = serde_json::from_value::<AppConfig>(json!({
            "check": {
                "concurrency": 5
            }
        }))
        .unwrap();

        assert_eq!(result.check.concurrency, 5);
        assert_eq!(result.store, StoreConfig::default());
        assert!(result.scrapers.is_empty());
    }

    #[test]
    fn app_config_from_full_object_parses_all_fields() {
        let result = serde_json::from_value::<AppConfig>(json!({
            "check": { "concurrency": 2 },
            "store": {
                "backend": {
                    "kind": "github",
                    "owner": "acme",
                    "repo": "sdk-registry",
                    "path": "services.json",
                    "branch": "main",
                    "tokenEnv": "GITHUB_TOKEN"
                },
                "readCacheTtlMs": 1000,
                "conflictRetries": 5
            },
            "scrapers": [
                {
                    "serviceId": "firebase",
                    "sources": { "web": { "url": "https://example.com/js" } }
                }
            ]
        }))
        .unwrap();

        assert_eq!(
            result,
            AppConfig {
                check: CheckConfig { concurrency: 2 },
                store: StoreConfig {
                    backend: StoreBackend::Github(GithubSettings {
                        owner: "acme".to_string(),
                        repo: "sdk-registry".to_string(),
                        path: "services.json".to_string(),
                        branch: Some("main".to_string()),
                        token_env: Some("GITHUB_TOKEN".to_string()),
                        api_url: None,
                    }),
                    read_cache_ttl_ms: 1000,
                    conflict_retries: 5,
                },
                scrapers: vec![
                    ScraperConfig::new("firebase")
                        .with_source(Platform::Web, SourceConfig::new("https://example.com/js"))
                ],
            }
        );
    }

    #[test]
    fn store_backend_parses_memory_and_sqlite_kinds() {
        let memory = serde_json::from_value::<StoreBackend>(json!({ "kind": "memory" })).unwrap();
        assert_eq!(memory, StoreBackend::Memory);

        let sqlite = serde_json::from_value::<StoreBackend>(json!({
            "kind": "sqlite",
            "path": "/tmp/registry.db"
        }))
        .unwrap();
        assert_eq!(
            sqlite,
            StoreBackend::Sqlite {
                path: Some(PathBuf::from("/tmp/registry.db"))
            }
        );
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = AppConfig::load(&temp_dir.path().join("absent.json")).unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn load_reports_parse_errors_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.json");
        std::fs::write(&path, "{ invalid").unwrap();

        let result = AppConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Parse { path: p, .. }) if p == path));
    }

    #[test]
    fn data_dir_with_env_uses_xdg_data_home_when_set() {
        let path = data_dir_with_env(
            Some("/tmp/test-data".to_string()),
            Some(PathBuf::from("/home/user")),
        );

        assert_eq!(path, PathBuf::from("/tmp/test-data/version-watch"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_home_local_share() {
        let path = data_dir_with_env(None, Some(PathBuf::from("/home/user")));

        assert_eq!(path, PathBuf::from("/home/user/.local/share/version-watch"));
    }

    #[test]
    fn data_dir_with_env_falls_back_to_current_dir_when_no_dirs_available() {
        let path = data_dir_with_env(None, None);
        assert_eq!(path, PathBuf::from("./version-watch"));
    }
}
