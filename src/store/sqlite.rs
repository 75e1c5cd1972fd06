//! SQLite document store
//!
//! Revisions are SHA-256 digests of the content. A write is a conditional
//! UPDATE on the expected revision, so only one of several racing writers
//! based on the same revision can succeed.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::{Document, DocumentStore, Revision, content_revision};

/// Name of the row holding the registry document
const DOCUMENT_NAME: &str = "registry";

pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
}

impl SqliteDocumentStore {
    pub fn open(db_path: &Path) -> Result<Self, StoreError> {
        info!("Opening registry database at {:?}", db_path);

        let conn = Connection::open(db_path)?;

        // Enable WAL mode for better concurrency
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_schema()?;

        Ok(store)
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }

    fn create_schema(&self) -> Result<(), StoreError> {
        let conn = self.lock_conn()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                name TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                revision TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
            [],
        )?;
        debug!("Registry schema ready");
        Ok(())
    }

    fn current_timestamp_ms() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

#[async_trait::async_trait]
impl DocumentStore for SqliteDocumentStore {
    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    async fn read(&self) -> Result<Document, StoreError> {
        let conn = self.lock_conn()?;
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT content, revision FROM documents WHERE name = ?1",
                [DOCUMENT_NAME],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((content, revision)) => Document {
                content,
                revision: Revision::new(revision),
            },
            // A missing row reads as the empty document
            None => Document {
                content: String::new(),
                revision: content_revision(""),
            },
        })
    }

    async fn write(&self, content: String, expected: &Revision) -> Result<Revision, StoreError> {
        let revision = content_revision(&content);
        let now = Self::current_timestamp_ms();
        let conn = self.lock_conn()?;

        let rows_affected = conn.execute(
            r#"
            UPDATE documents
            SET content = ?1, revision = ?2, updated_at = ?3
            WHERE name = ?4 AND revision = ?5
            "#,
            (
                &content,
                revision.as_str(),
                now,
                DOCUMENT_NAME,
                expected.as_str(),
            ),
        )?;

        if rows_affected > 0 {
            debug!("Registry document updated to revision {}", revision);
            return Ok(revision);
        }

        // First write: only valid when the caller read the empty document.
        // INSERT OR IGNORE lets exactly one racing first writer through.
        if *expected == content_revision("") {
            let rows_inserted = conn.execute(
                r#"
                INSERT OR IGNORE INTO documents (name, content, revision, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
                (DOCUMENT_NAME, &content, revision.as_str(), now),
            )?;
            if rows_inserted > 0 {
                debug!("Registry document created at revision {}", revision);
                return Ok(revision);
            }
        }

        Err(StoreError::conflict(expected.as_str()))
    }
}
