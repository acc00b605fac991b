use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use quorum_llm::Role;

/// One stored conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
}

/// A named piece of generated output (a solution, a review) kept for later prompts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "file_path")]
    pub name: String,
    pub content: String,
    pub description: String,
}

/// Persistent conversation memory shared by all tasks.
///
/// Implementations serialize their own writes. Storage failures are logged by the
/// store and never surfaced: memory is best-effort context, not a source of truth.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    async fn append(&self, conversation_id: &str, role: Role, content: &str);

    async fn read(&self, conversation_id: &str) -> Vec<MemoryEntry>;

    async fn append_artifact(&self, name: &str, content: &str, description: &str);

    /// The `limit` most recent artifacts, oldest first
    async fn recent_artifacts(&self, limit: usize) -> Vec<ArtifactRecord>;

    async fn set_context(&self, key: &str, value: &str);

    async fn context(&self) -> BTreeMap<String, String>;
}

/// Render stored memory into a block that can be prepended to a prompt.
///
/// Empty sections are omitted; an entirely empty memory renders as `""`.
#[must_use]
pub fn render_prompt_context(
    history: &[MemoryEntry],
    artifacts: &[ArtifactRecord],
    context: &BTreeMap<String, String>,
) -> String {
    let mut parts: Vec<String> = Vec::new();

    if !history.is_empty() {
        parts.push("Previous Conversation:".to_string());
        for entry in history {
            parts.push(format!("{}: {}", entry.role, entry.content));
        }
    }

    if !artifacts.is_empty() {
        parts.push("\nRecent Code Changes:".to_string());
        for artifact in artifacts {
            parts.push(format!(
                "File: {}\nDescription: {}\nTimestamp: {}",
                artifact.name,
                artifact.description,
                artifact.timestamp.to_rfc3339()
            ));
        }
    }

    if !context.is_empty() {
        parts.push("\nCurrent Context:".to_string());
        for (key, value) in context {
            parts.push(format!("{key}: {value}"));
        }
    }

    parts.join("\n\n")
}

/// Store used when memory is disabled: accepts writes, remembers nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStore;

#[async_trait]
impl MemoryStore for NoopStore {
    async fn append(&self, _conversation_id: &str, _role: Role, _content: &str) {}

    async fn read(&self, _conversation_id: &str) -> Vec<MemoryEntry> {
        Vec::new()
    }

    async fn append_artifact(&self, _name: &str, _content: &str, _description: &str) {}

    async fn recent_artifacts(&self, _limit: usize) -> Vec<ArtifactRecord> {
        Vec::new()
    }

    async fn set_context(&self, _key: &str, _value: &str) {}

    async fn context(&self) -> BTreeMap<String, String> {
        BTreeMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_empty_memory_is_empty() {
        assert_eq!(render_prompt_context(&[], &[], &BTreeMap::new()), "");
    }

    #[test]
    fn test_render_sections_in_order() {
        let ts = DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let history = vec![
            MemoryEntry {
                timestamp: ts,
                role: Role::User,
                content: "write a parser".to_string(),
            },
            MemoryEntry {
                timestamp: ts,
                role: Role::Assistant,
                content: "BUILD".to_string(),
            },
        ];
        let artifacts = vec![ArtifactRecord {
            timestamp: ts,
            name: "claude_solution".to_string(),
            content: "fn main() {}".to_string(),
            description: "Solution generated by claude".to_string(),
        }];
        let mut context = BTreeMap::new();
        context.insert("latest_search_summary".to_string(), "nom is fast".to_string());

        let rendered = render_prompt_context(&history, &artifacts, &context);

        assert_eq!(
            rendered,
            "Previous Conversation:\n\nuser: write a parser\n\nassistant: BUILD\n\n\
             \nRecent Code Changes:\n\nFile: claude_solution\nDescription: Solution generated by claude\n\
             Timestamp: 2024-05-01T12:00:00+00:00\n\n\
             \nCurrent Context:\n\nlatest_search_summary: nom is fast"
        );
    }

    #[test]
    fn test_artifact_serializes_with_file_path_key() {
        let record = ArtifactRecord {
            timestamp: Utc::now(),
            name: "solution_review".to_string(),
            content: "x".to_string(),
            description: "y".to_string(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["file_path"], "solution_review");
    }

    #[tokio::test]
    async fn test_noop_store_remembers_nothing() {
        let store = NoopStore;
        store.append("c", Role::User, "hello").await;
        store.set_context("k", "v").await;
        assert!(store.read("c").await.is_empty());
        assert!(store.context().await.is_empty());
    }
}
