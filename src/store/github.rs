//! Git-hosting contents API document store
//!
//! Reads and writes one file through the GitHub contents API. The blob SHA
//! returned by the API is the revision; a PUT carrying a stale SHA is
//! rejected by the server, which surfaces as a conflict.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{DEFAULT_GITHUB_API_URL, GithubSettings, USER_AGENT};
use crate::error::{ConfigError, StoreError};
use crate::store::{Document, DocumentStore, Revision};

/// Commit message used for registry updates
const COMMIT_MESSAGE: &str = "Update service registry";

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    sha: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct PutContentsResponse {
    content: ContentsResponse,
}

pub struct GitHubDocumentStore {
    client: reqwest::Client,
    contents_url: String,
    branch: Option<String>,
    token: Option<String>,
}

impl GitHubDocumentStore {
    pub fn new(api_url: &str, owner: &str, repo: &str, path: &str) -> Result<Self, ConfigError> {
        let client = reqwest::Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self {
            client,
            contents_url: format!(
                "{}/repos/{}/{}/contents/{}",
                api_url.trim_end_matches('/'),
                owner,
                repo,
                path.trim_start_matches('/')
            ),
            branch: None,
            token: None,
        })
    }

    /// Build from configuration, reading the token from the named
    /// environment variable when one is given
    pub fn from_settings(settings: &GithubSettings) -> Result<Self, ConfigError> {
        let api_url = settings
            .api_url
            .as_deref()
            .unwrap_or(DEFAULT_GITHUB_API_URL);
        let mut store = Self::new(api_url, &settings.owner, &settings.repo, &settings.path)?;

        if let Some(branch) = &settings.branch {
            store = store.with_branch(branch);
        }
        if let Some(var) = &settings.token_env {
            let token =
                std::env::var(var).map_err(|_| ConfigError::MissingEnv(var.to_string()))?;
            store = store.with_token(token);
        }

        Ok(store)
    }

    pub fn with_branch(self, branch: impl Into<String>) -> Self {
        Self {
            branch: Some(branch.into()),
            ..self
        }
    }

    pub fn with_token(self, token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..self
        }
    }

    fn request(&self, method: reqwest::Method, url: Url) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    fn read_url(&self) -> Result<Url, StoreError> {
        let mut url = Url::parse(&self.contents_url)
            .map_err(|e| StoreError::Backend(format!("Invalid contents URL: {}", e)))?;
        if let Some(branch) = &self.branch {
            url.query_pairs_mut().append_pair("ref", branch);
        }
        Ok(url)
    }

    fn decode_content(encoded: &str) -> Result<String, StoreError> {
        // The API wraps base64 content at 60 columns
        let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = STANDARD
            .decode(compact)
            .map_err(|e| StoreError::Corrupt(format!("Invalid base64 content: {}", e)))?;
        String::from_utf8(bytes)
            .map_err(|e| StoreError::Corrupt(format!("Content is not UTF-8: {}", e)))
    }
}

#[async_trait::async_trait]
impl DocumentStore for GitHubDocumentStore {
    fn backend_name(&self) -> &'static str {
        "github"
    }

    async fn read(&self) -> Result<Document, StoreError> {
        let response = self
            .request(reqwest::Method::GET, self.read_url()?)
            .send()
            .await?;

        let status = response.status();

        // No file yet: empty document, written without a sha
        if status == StatusCode::NOT_FOUND {
            debug!("Registry file not found at {}", self.contents_url);
            return Ok(Document {
                content: String::new(),
                revision: Revision::new(""),
            });
        }

        if !status.is_success() {
            warn!("Contents API returned status {}: {}", status, self.contents_url);
            return Err(StoreError::Backend(format!("Unexpected status: {}", status)));
        }

        let contents: ContentsResponse = response.json().await.map_err(|e| {
            warn!("Failed to parse contents response: {}", e);
            StoreError::Backend(e.to_string())
        })?;

        Ok(Document {
            content: Self::decode_content(&contents.content)?,
            revision: Revision::new(contents.sha),
        })
    }

    async fn write(&self, content: String, expected: &Revision) -> Result<Revision, StoreError> {
        let url = Url::parse(&self.contents_url)
            .map_err(|e| StoreError::Backend(format!("Invalid contents URL: {}", e)))?;

        let body = PutContentsRequest {
            message: COMMIT_MESSAGE,
            content: STANDARD.encode(content.as_bytes()),
            sha: (!expected.as_str().is_empty()).then_some(expected.as_str()),
            branch: self.branch.as_deref(),
        };

        let response = self
            .request(reqwest::Method::PUT, url)
            .json(&body)
            .send()
            .await?;

        let status = response.status();

        // 409: sha does not match the branch head; 422: sha missing or stale
        if status == StatusCode::CONFLICT || status == StatusCode::UNPROCESSABLE_ENTITY {
            warn!("Registry write rejected with {} at revision {}", status, expected);
            return Err(StoreError::conflict(expected.as_str()));
        }

        if !status.is_success() {
            return Err(StoreError::Backend(format!("Unexpected status: {}", status)));
        }

        let updated: PutContentsResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        debug!("Registry committed at revision {}", updated.content.sha);
        Ok(Revision::new(updated.content.sha))
    }
}
