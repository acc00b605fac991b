//! Concurrent fan-out across solver backends

use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use quorum_llm::{Completer, CompletionResult, Message};

use crate::failover::{Candidate, CandidateChain, DispatchOutcome, FailoverDispatcher};

/// A completer registered under a backend name, with the bound on one call to it.
#[derive(Clone)]
pub struct NamedCompleter {
    pub name: String,
    pub completer: Arc<dyn Completer>,
    pub timeout: Duration,
}

impl NamedCompleter {
    pub fn new(name: impl Into<String>, completer: Arc<dyn Completer>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            completer,
            timeout,
        }
    }

    /// Single-candidate chain for dispatching through a [`FailoverDispatcher`].
    #[must_use]
    pub fn chain(&self) -> CandidateChain<dyn Completer> {
        CandidateChain::single(Candidate::primary(
            self.name.clone(),
            Arc::clone(&self.completer),
            self.timeout,
        ))
    }
}

impl std::fmt::Debug for NamedCompleter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamedCompleter")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// One backend's share of a fan-out
#[derive(Debug, Clone)]
pub struct BackendOutcome {
    pub backend: String,
    pub outcome: DispatchOutcome<CompletionResult>,
}

impl BackendOutcome {
    #[must_use]
    pub fn content(&self) -> Option<&str> {
        self.outcome.result().map(|r| r.content.as_str())
    }

    /// Model that produced the content. Names the backup model when the backend's
    /// primary model failed over.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.outcome.result().map(|r| r.model.as_str())
    }
}

/// Runs every backend concurrently over the same input and waits for all of them.
#[derive(Debug, Clone)]
pub struct FanOutAggregator {
    dispatcher: FailoverDispatcher,
}

impl Default for FanOutAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl FanOutAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            dispatcher: FailoverDispatcher::new("fan-out"),
        }
    }

    /// Invoke all `backends` concurrently with `messages`.
    ///
    /// Returns one outcome per backend in the order given. A failing or slow
    /// backend never cancels the others; the call completes once every backend has
    /// produced an outcome or hit its timeout.
    pub async fn run(
        &self,
        backends: &[NamedCompleter],
        messages: &[Message],
    ) -> Vec<BackendOutcome> {
        debug!(backends = backends.len(), "Starting fan-out");

        let calls = backends.iter().map(|backend| async move {
            let chain = backend.chain();
            let outcome = self
                .dispatcher
                .dispatch(&chain, |completer| async move {
                    completer.complete(messages).await
                })
                .await;
            BackendOutcome {
                backend: backend.name.clone(),
                outcome,
            }
        });
        let outcomes = join_all(calls).await;

        for outcome in &outcomes {
            if let Some(model) = outcome.model() {
                debug!(backend = %outcome.backend, model, "Backend answered");
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.outcome.is_success()).count();
        info!(
            backends = outcomes.len(),
            succeeded,
            failed = outcomes.len() - succeeded,
            "Fan-out completed"
        );
        outcomes
    }
}

/// Pick the solution to review: `preferred`'s success if it has one, otherwise the
/// first success in configured order.
#[must_use]
pub fn select_primary<'a>(
    outcomes: &'a [BackendOutcome],
    preferred: &str,
) -> Option<&'a BackendOutcome> {
    outcomes
        .iter()
        .find(|o| o.backend == preferred && o.outcome.is_success())
        .or_else(|| outcomes.iter().find(|o| o.outcome.is_success()))
}

const FENCE: &str = "```";

/// Content of the first fenced code block in `content`.
///
/// The info string on the opening fence line (`python`, `rust`, ...) is dropped.
/// An unterminated fence yields the rest of the text. Returns `None` when there is
/// no fence or the block is blank.
#[must_use]
pub fn extract_primary_artifact(content: &str) -> Option<String> {
    let start = content.find(FENCE)? + FENCE.len();
    let rest = &content[start..];
    let block = rest.find(FENCE).map_or(rest, |end| &rest[..end]);

    let body = match block.split_once('\n') {
        Some((info, body)) if is_info_string(info) => body,
        _ => block,
    };

    let body = body.trim();
    (!body.is_empty()).then(|| body.to_string())
}

fn is_info_string(line: &str) -> bool {
    let line = line.trim();
    line.is_empty()
        || line
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '#' | '.'))
}
