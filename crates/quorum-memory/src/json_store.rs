//! Memory persisted as three JSON documents in one directory
//!
//! - `chat_history.json`: `{"conversations": {id: [entry, ...]}}`
//! - `code_changes.json`: `{"changes": [artifact, ...]}`
//! - `context.json`: `{"current_context": {key: value}}`
//!
//! Each write rewrites its document atomically. File I/O runs on tokio's blocking
//! pool; a single async mutex serializes read-modify-write cycles across tasks.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use quorum_llm::Role;
use quorum_utils::atomic_write::write_file_atomic;

use crate::MemoryError;
use crate::types::{ArtifactRecord, MemoryEntry, MemoryStore};

const CHAT_HISTORY_FILE: &str = "chat_history.json";
const CODE_CHANGES_FILE: &str = "code_changes.json";
const CONTEXT_FILE: &str = "context.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatHistory {
    conversations: BTreeMap<String, Vec<MemoryEntry>>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CodeChanges {
    changes: Vec<ArtifactRecord>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ContextDoc {
    current_context: BTreeMap<String, String>,
}

#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `dir`.
    ///
    /// # Errors
    ///
    /// Returns `MemoryError::Io` if the directory or the initial documents cannot
    /// be created.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, MemoryError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| MemoryError::Io {
            path: dir.clone(),
            reason: e.to_string(),
        })?;

        Self::init_document(&dir.join(CHAT_HISTORY_FILE), &ChatHistory::default())?;
        Self::init_document(&dir.join(CODE_CHANGES_FILE), &CodeChanges::default())?;
        Self::init_document(&dir.join(CONTEXT_FILE), &ContextDoc::default())?;

        debug!(dir = %dir.display(), "Opened JSON memory store");
        Ok(Self {
            dir,
            lock: Mutex::new(()),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn init_document<T: Serialize>(path: &Path, empty: &T) -> Result<(), MemoryError> {
        if path.exists() {
            return Ok(());
        }
        let body = serde_json::to_string_pretty(empty).map_err(|e| MemoryError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        write_file_atomic(path, &body).map_err(|e| MemoryError::Io {
            path: path.to_path_buf(),
            reason: format!("{e:#}"),
        })
    }

    /// Read-modify-write one document on the blocking pool, under the store lock.
    async fn update<T, F>(&self, file: &'static str, edit: F)
    where
        T: Serialize + DeserializeOwned + Default + Send + 'static,
        F: FnOnce(&mut T) + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.dir.join(file);
        let task = tokio::task::spawn_blocking(move || {
            let mut doc: T = load(&path);
            edit(&mut doc);
            save(&path, &doc);
        });
        if let Err(e) = task.await {
            warn!(file, error = %e, "Memory write task failed");
        }
    }

    /// Current contents of one document, read on the blocking pool.
    async fn snapshot<T>(&self, file: &'static str) -> T
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        let _guard = self.lock.lock().await;
        let path = self.dir.join(file);
        tokio::task::spawn_blocking(move || load(&path))
            .await
            .unwrap_or_else(|e| {
                warn!(file, error = %e, "Memory read task failed");
                T::default()
            })
    }
}

/// Load a document, falling back to its empty form if it is missing or corrupt.
fn load<T: DeserializeOwned + Default>(path: &Path) -> T {
    match std::fs::read_to_string(path) {
        Ok(body) => serde_json::from_str(&body).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Memory document is corrupt, treating as empty");
            T::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => T::default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read memory document");
            T::default()
        }
    }
}

fn save<T: Serialize>(path: &Path, doc: &T) {
    let body = match serde_json::to_string_pretty(doc) {
        Ok(body) => body,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to serialize memory document");
            return;
        }
    };
    if let Err(e) = write_file_atomic(path, &body) {
        warn!(path = %path.display(), error = %format!("{e:#}"), "Failed to write memory document");
    }
}

#[async_trait]
impl MemoryStore for JsonFileStore {
    async fn append(&self, conversation_id: &str, role: Role, content: &str) {
        let conversation_id = conversation_id.to_string();
        let entry = MemoryEntry {
            timestamp: Utc::now(),
            role,
            content: content.to_string(),
        };
        self.update(CHAT_HISTORY_FILE, move |doc: &mut ChatHistory| {
            doc.conversations
                .entry(conversation_id)
                .or_default()
                .push(entry);
        })
        .await;
    }

    async fn read(&self, conversation_id: &str) -> Vec<MemoryEntry> {
        let mut doc: ChatHistory = self.snapshot(CHAT_HISTORY_FILE).await;
        doc.conversations.remove(conversation_id).unwrap_or_default()
    }

    async fn append_artifact(&self, name: &str, content: &str, description: &str) {
        let record = ArtifactRecord {
            timestamp: Utc::now(),
            name: name.to_string(),
            content: content.to_string(),
            description: description.to_string(),
        };
        self.update(CODE_CHANGES_FILE, move |doc: &mut CodeChanges| {
            doc.changes.push(record);
        })
        .await;
    }

    async fn recent_artifacts(&self, limit: usize) -> Vec<ArtifactRecord> {
        let mut doc: CodeChanges = self.snapshot(CODE_CHANGES_FILE).await;
        let skip = doc.changes.len().saturating_sub(limit);
        doc.changes.drain(..skip);
        doc.changes
    }

    async fn set_context(&self, key: &str, value: &str) {
        let (key, value) = (key.to_string(), value.to_string());
        self.update(CONTEXT_FILE, move |doc: &mut ContextDoc| {
            doc.current_context.insert(key, value);
        })
        .await;
    }

    async fn context(&self) -> BTreeMap<String, String> {
        let doc: ContextDoc = self.snapshot(CONTEXT_FILE).await;
        doc.current_context
    }
}
