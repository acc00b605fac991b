use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use quorum_search::SearchHit;
use quorum_utils::{CapabilityError, ErrorCategory, UserFriendlyError};

use crate::failover::DispatchOutcome;
use crate::fanout::BackendOutcome;

/// Lifecycle of one task.
///
/// `Accepted → Classified → (Searched)? → Solved → Reviewed → Done`. A simple
/// question goes from `Classified` or `Searched` straight to `Done`. Any live state
/// may move to the absorbing `Errored`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaskState {
    Accepted,
    Classified,
    Searched,
    Solved,
    Reviewed,
    Done,
    Errored,
}

impl TaskState {
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Errored)
    }

    fn legal_next(self) -> &'static [TaskState] {
        use TaskState::{Classified, Done, Errored, Reviewed, Searched, Solved};
        match self {
            Self::Accepted => &[Classified, Errored],
            Self::Classified => &[Searched, Solved, Done, Errored],
            Self::Searched => &[Solved, Done, Errored],
            Self::Solved => &[Reviewed, Errored],
            Self::Reviewed => &[Done, Errored],
            Self::Done | Self::Errored => &[],
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: TaskState) -> bool {
        self.legal_next().contains(&next)
    }
}

#[derive(Error, Debug)]
pub enum OrchestrationError {
    #[error("Task classification failed: {0}")]
    Classification(#[source] CapabilityError),

    #[error("Answering the question failed: {0}")]
    Answer(#[source] CapabilityError),

    #[error("Solution review failed: {0}")]
    Review(#[source] CapabilityError),

    #[error("No backend produced a solution (tried {})", attempted.join(", "))]
    NoSolution { attempted: Vec<String> },

    #[error("Invalid task transition from {from} to {to}")]
    InvalidTransition { from: TaskState, to: TaskState },
}

impl UserFriendlyError for OrchestrationError {
    fn user_message(&self) -> String {
        match self {
            Self::Classification(e) | Self::Answer(e) | Self::Review(e) => {
                format!("The coordinator could not complete the task: {}", e.user_message())
            }
            Self::NoSolution { attempted } => format!(
                "None of the coding backends returned a solution ({})",
                attempted.join(", ")
            ),
            Self::InvalidTransition { from, to } => {
                format!("Task cannot move from {from} to {to}")
            }
        }
    }

    fn context(&self) -> Option<String> {
        match self {
            Self::NoSolution { .. } => {
                Some("Every coder failed or timed out; see warnings for each attempt.".to_string())
            }
            _ => None,
        }
    }

    fn suggestions(&self) -> Vec<String> {
        match self {
            Self::Classification(e) | Self::Answer(e) | Self::Review(e) => e.suggestions(),
            Self::NoSolution { .. } => vec![
                "Check the API keys of the configured coders".to_string(),
                "Run with --verbose to see each backend's error".to_string(),
            ],
            Self::InvalidTransition { .. } => Vec::new(),
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Classification(e) | Self::Answer(e) | Self::Review(e) => e.category(),
            Self::NoSolution { .. } | Self::InvalidTransition { .. } => ErrorCategory::Orchestration,
        }
    }
}

/// Search stage result. Kept even when it produced no summary.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub dispatch: DispatchOutcome<Vec<SearchHit>>,
    pub summary: Option<String>,
}

/// Everything known about one task while it runs.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub task_id: String,
    pub conversation_id: String,
    pub created_at: DateTime<Utc>,
    state: TaskState,
    pub analysis: Option<String>,
    pub search: Option<SearchOutcome>,
    /// Per-coder outcomes in configured order
    pub solutions: Vec<BackendOutcome>,
    pub review: Option<String>,
    pub frames_emitted: u64,
}

impl TaskRecord {
    pub fn new(task_id: impl Into<String>, conversation_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            conversation_id: conversation_id.into(),
            created_at: Utc::now(),
            state: TaskState::Accepted,
            analysis: None,
            search: None,
            solutions: Vec::new(),
            review: None,
            frames_emitted: 0,
        }
    }

    #[must_use]
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// # Errors
    ///
    /// Returns `OrchestrationError::InvalidTransition` for a backward or skipped move.
    pub fn transition(&mut self, next: TaskState) -> Result<(), OrchestrationError> {
        if !self.state.can_transition_to(next) {
            return Err(OrchestrationError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        tracing::debug!(from = %self.state, to = %next, "Task state transition");
        self.state = next;
        Ok(())
    }

    /// Search summary, if the search stage produced one.
    #[must_use]
    pub fn search_summary(&self) -> Option<&str> {
        self.search.as_ref().and_then(|s| s.summary.as_deref())
    }
}
