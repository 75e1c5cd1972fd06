//! In-memory document store; revisions are a monotonic counter

use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::store::{Document, DocumentStore, Revision};

struct State {
    content: String,
    generation: u64,
}

impl State {
    fn revision(&self) -> Revision {
        Revision::new(self.generation.to_string())
    }
}

pub struct MemoryDocumentStore {
    state: Mutex<State>,
}

impl MemoryDocumentStore {
    /// An empty document at revision `0`
    pub fn new() -> Self {
        Self::with_content("")
    }

    pub fn with_content(content: impl Into<String>) -> Self {
        Self {
            state: Mutex::new(State {
                content: content.into(),
                generation: 0,
            }),
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self) -> Result<Document, StoreError> {
        let state = self.state.lock().await;
        Ok(Document {
            content: state.content.clone(),
            revision: state.revision(),
        })
    }

    async fn write(&self, content: String, expected: &Revision) -> Result<Revision, StoreError> {
        let mut state = self.state.lock().await;
        if state.revision() != *expected {
            return Err(StoreError::conflict(expected.as_str()));
        }
        state.content = content;
        state.generation += 1;
        Ok(state.revision())
    }
}
