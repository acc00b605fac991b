//! Top-level error type for the quorum binary and library surface

use thiserror::Error;

use quorum_engine::OrchestrationError;
use quorum_memory::MemoryError;
use quorum_utils::redaction::redact_error_message;
use quorum_utils::{CapabilityError, ConfigError, ErrorCategory, ExitCode, UserFriendlyError};

#[derive(Error, Debug)]
pub enum QuorumError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Backend error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("Orchestration error: {0}")]
    Orchestration(#[from] OrchestrationError),

    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("Server error: {0}")]
    Server(String),

    /// A task ran to completion but ended with an error frame
    #[error("Task failed: {0}")]
    TaskFailed(String),
}

impl QuorumError {
    /// Map this error to the CLI exit code.
    #[must_use]
    pub fn to_exit_code(&self) -> ExitCode {
        match self {
            Self::Config(e) => ExitCode::from(e),
            Self::Capability(CapabilityError::Misconfiguration(_)) => ExitCode::CLI_ARGS,
            _ => ExitCode::INTERNAL,
        }
    }

    /// Message, context and suggestions, redacted for printing.
    #[must_use]
    pub fn display_for_user(&self) -> String {
        let mut output = format!("Error: {}\n", self.user_message());

        if let Some(ctx) = self.context() {
            output.push_str(&format!("\nContext: {ctx}\n"));
        }

        let suggestions = self.suggestions();
        if !suggestions.is_empty() {
            output.push_str("\nSuggestions:\n");
            for suggestion in suggestions {
                output.push_str(&format!("  • {suggestion}\n"));
            }
        }

        redact_error_message(&output)
    }
}

impl UserFriendlyError for QuorumError {
    fn user_message(&self) -> String {
        match self {
            Self::Config(e) => e.user_message(),
            Self::Capability(e) => e.user_message(),
            Self::Orchestration(e) => e.user_message(),
            Self::Memory(e) => e.to_string(),
            Self::Server(msg) => format!("The server could not start: {msg}"),
            Self::TaskFailed(msg) => format!("The task did not complete: {msg}"),
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::Config(e) => e.context(),
            Self::Capability(e) => e.context(),
            Self::Orchestration(e) => e.context(),
            Self::Memory(_) => {
                Some("Conversation memory is kept under [memory] dir.".to_string())
            }
            Self::Server(_) | Self::TaskFailed(_) => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Config(e) => e.suggestions(),
            Self::Capability(e) => e.suggestions(),
            Self::Orchestration(e) => e.suggestions(),
            Self::Memory(_) => vec![
                "Check that the memory directory is writable".to_string(),
                "Set [memory] backend = \"inmemory\" to run without persistence".to_string(),
            ],
            Self::Server(_) => vec![
                "Pick another port with --port".to_string(),
                "Raise [server] port_search_attempts".to_string(),
            ],
            Self::TaskFailed(_) => {
                vec!["Run with --verbose to see each backend's error".to_string()]
            }
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(e) => e.category(),
            Self::Capability(e) => e.category(),
            Self::Orchestration(e) => e.category(),
            Self::Memory(_) => ErrorCategory::FileSystem,
            Self::Server(_) => ErrorCategory::Configuration,
            Self::TaskFailed(_) => ErrorCategory::Orchestration,
        }
    }
}
