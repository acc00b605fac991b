//! Conversation memory for quorum
//!
//! A [`MemoryStore`] keeps per-conversation history, recently produced artifacts
//! and a small key/value context. The orchestrator reads it to enrich prompts and
//! writes to it as tasks finish.

mod in_memory;
mod json_store;
mod types;

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use in_memory::InMemoryStore;
pub use json_store::JsonFileStore;
pub use types::{ArtifactRecord, MemoryEntry, MemoryStore, NoopStore, render_prompt_context};

use quorum_config::{MemoryBackend, MemoryConfig};

#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Memory store at {} is unusable: {reason}", path.display())]
    Io { path: PathBuf, reason: String },
}

/// Open the store selected by `[memory] backend`.
///
/// # Errors
///
/// Returns `MemoryError::Io` if the JSON store directory cannot be prepared.
pub fn open_store(config: &MemoryConfig) -> Result<Arc<dyn MemoryStore>, MemoryError> {
    Ok(match config.backend {
        MemoryBackend::Json => Arc::new(JsonFileStore::open(&config.dir)?),
        MemoryBackend::InMemory => Arc::new(InMemoryStore::new()),
        MemoryBackend::Disabled => Arc::new(NoopStore),
    })
}
