use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;

use quorum_llm::Role;

use crate::types::{ArtifactRecord, MemoryEntry, MemoryStore};

#[derive(Debug, Default)]
struct Inner {
    conversations: HashMap<String, Vec<MemoryEntry>>,
    artifacts: Vec<ArtifactRecord>,
    context: BTreeMap<String, String>,
}

/// Process-local memory, lost on exit. Used by tests and `backend = "inmemory"`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<Inner>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .conversations
            .entry(conversation_id.to_string())
            .or_default()
            .push(MemoryEntry {
                timestamp: Utc::now(),
                role,
                content: content.to_string(),
            });
    }

    async fn read(&self, conversation_id: &str) -> Vec<MemoryEntry> {
        let inner = self.inner.lock().await;
        inner
            .conversations
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn append_artifact(&self, name: &str, content: &str, description: &str) {
        let mut inner = self.inner.lock().await;
        inner.artifacts.push(ArtifactRecord {
            timestamp: Utc::now(),
            name: name.to_string(),
            content: content.to_string(),
            description: description.to_string(),
        });
    }

    async fn recent_artifacts(&self, limit: usize) -> Vec<ArtifactRecord> {
        let inner = self.inner.lock().await;
        let skip = inner.artifacts.len().saturating_sub(limit);
        inner.artifacts[skip..].to_vec()
    }

    async fn set_context(&self, key: &str, value: &str) {
        let mut inner = self.inner.lock().await;
        inner.context.insert(key.to_string(), value.to_string());
    }

    async fn context(&self) -> BTreeMap<String, String> {
        self.inner.lock().await.context.clone()
    }
}
