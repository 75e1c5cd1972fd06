//! Revision-tokened document storage
//!
//! The whole registry lives in one document. Every read returns an opaque
//! [`Revision`]; a write must present the revision it was based on and
//! fails with [`StoreError::Conflict`] when the document moved on.
//!
//! ```text
//! ┌──────────────────┐  read()/write(rev)  ┌───────────────────────┐
//! │ ServiceRegistry  │────────────────────▶│ DocumentStore         │
//! │ (filter, cache)  │                     │ memory|sqlite|github  │
//! └──────────────────┘                     └───────────────────────┘
//! ```

pub mod filter;
pub mod github;
pub mod memory;
pub mod registry;
pub mod sqlite;

use std::fmt;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::config::{StoreBackend, StoreConfig, db_path};
use crate::error::{ConfigError, StoreError};

pub use filter::ServiceFilter;
pub use github::GitHubDocumentStore;
pub use memory::MemoryDocumentStore;
pub use registry::{RegistryDocument, ServiceRegistry, Snapshot};
pub use sqlite::SqliteDocumentStore;

/// Opaque token identifying one state of the stored document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw document content and the revision it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub content: String,
    pub revision: Revision,
}

/// Compare-and-swap document storage
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    fn backend_name(&self) -> &'static str;

    /// Read the current content and its revision
    async fn read(&self) -> Result<Document, StoreError>;

    /// Replace the content if the stored revision still equals `expected`.
    ///
    /// Returns the new revision. A stale `expected` fails with
    /// `StoreError::Conflict` and leaves the stored content untouched.
    async fn write(&self, content: String, expected: &Revision) -> Result<Revision, StoreError>;
}

/// SHA-256 hex digest of the content, used as a content-addressed revision
pub fn content_revision(content: &str) -> Revision {
    Revision(hex::encode(Sha256::digest(content.as_bytes())))
}

/// Construct the backend selected by configuration
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn DocumentStore>, ConfigError> {
    let store: Arc<dyn DocumentStore> = match &config.backend {
        StoreBackend::Memory => Arc::new(MemoryDocumentStore::new()),
        StoreBackend::Sqlite { path } => {
            let path = path.clone().unwrap_or_else(db_path);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            Arc::new(SqliteDocumentStore::open(&path)?)
        }
        StoreBackend::Github(settings) => Arc::new(GitHubDocumentStore::from_settings(settings)?),
    };
    Ok(store)
}
