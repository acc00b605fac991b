//! Normalized message and result types shared by every completion backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use quorum_utils::CapabilityError;

/// Role of a message in a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System-level instructions
    System,
    /// User input
    User,
    /// Assistant response
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    #[must_use]
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// Why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinishReason {
    #[default]
    Stop,
    Length,
    Error,
    Other,
}

impl FinishReason {
    /// Map an OpenAI `finish_reason` or Anthropic `stop_reason` string.
    #[must_use]
    pub fn from_provider(raw: Option<&str>) -> Self {
        match raw {
            None | Some("stop") | Some("end_turn") | Some("stop_sequence") => Self::Stop,
            Some("length") | Some("max_tokens") => Self::Length,
            Some("error") => Self::Error,
            Some(_) => Self::Other,
        }
    }
}

/// Token accounting reported by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Result of one successful completion. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionResult {
    pub content: String,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    pub cached: bool,
    /// Provider label, e.g. "openrouter"
    pub provider: String,
    /// Model that actually produced the content
    pub model: String,
}

impl CompletionResult {
    #[must_use]
    pub fn new(
        content: impl Into<String>,
        provider: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            content: content.into(),
            finish_reason: FinishReason::Stop,
            usage: Usage::default(),
            cached: false,
            provider: provider.into(),
            model: model.into(),
        }
    }

    #[must_use]
    pub fn with_usage(mut self, prompt_tokens: u64, completion_tokens: u64) -> Self {
        self.usage = Usage {
            prompt_tokens,
            completion_tokens,
        };
        self
    }

    #[must_use]
    pub fn with_finish_reason(mut self, reason: FinishReason) -> Self {
        self.finish_reason = reason;
        self
    }
}

/// A text-generation capability.
///
/// Adapters reshape [`Message`]s into their vendor format, call the provider and
/// map every failure into a [`CapabilityError`]. Callers bound each call with their
/// own timeout; adapters never retry across models.
#[async_trait]
pub trait Completer: Send + Sync {
    /// Stable name used in attempt histories and logs
    fn name(&self) -> &str;

    /// Submit the conversation and wait for a single completion
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError` for transport failures, provider rejections,
    /// timeouts and malformed responses.
    async fn complete(&self, messages: &[Message]) -> Result<CompletionResult, CapabilityError>;
}
