//! One logical backend backed by a primary model and named backup models

use async_trait::async_trait;
use std::time::Duration;

use quorum_llm::{Completer, CompletionResult, Message};
use quorum_utils::CapabilityError;

use crate::failover::{CandidateChain, DispatchOutcome, FailoverDispatcher};

/// A [`Completer`] that resolves its models through a [`FailoverDispatcher`].
///
/// Callers see a single backend; the chain tries the primary model first and then
/// each backup in configured order. An exhausted chain surfaces as
/// `CapabilityError::Exhausted` listing every model tried.
pub struct ModelChain {
    name: String,
    chain: CandidateChain<dyn Completer>,
    dispatcher: FailoverDispatcher,
}

impl ModelChain {
    pub fn new(name: impl Into<String>, chain: CandidateChain<dyn Completer>) -> Self {
        let name = name.into();
        Self {
            dispatcher: FailoverDispatcher::new(name.clone()),
            name,
            chain,
        }
    }

    #[must_use]
    pub fn models(&self) -> Vec<String> {
        self.chain.names()
    }

    /// Upper bound on one `complete` call: every model timing out in turn.
    #[must_use]
    pub fn total_timeout(&self) -> Duration {
        self.chain.total_timeout()
    }

    /// Walk the model chain, keeping the full attempt history.
    pub async fn dispatch(&self, messages: &[Message]) -> DispatchOutcome<CompletionResult> {
        self.dispatcher
            .dispatch(&self.chain, |completer| async move {
                completer.complete(messages).await
            })
            .await
    }
}

impl std::fmt::Debug for ModelChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelChain")
            .field("name", &self.name)
            .field("models", &self.chain)
            .finish()
    }
}

#[async_trait]
impl Completer for ModelChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[Message]) -> Result<CompletionResult, CapabilityError> {
        self.dispatch(messages).await.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failover::Candidate;
    use crate::test_support::MockCompleter;
    use std::sync::Arc;

    fn candidate(mock: MockCompleter, primary: bool) -> Candidate<dyn Completer> {
        let name = mock.name().to_string();
        let completer: Arc<dyn Completer> = Arc::new(mock);
        Candidate::new(name, primary, completer, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn test_backup_model_answers_when_primary_fails() {
        let chain = CandidateChain::new(vec![
            candidate(
                MockCompleter::failing("hermes", CapabilityError::ProviderOutage("502".into())),
                true,
            ),
            candidate(MockCompleter::replying("hermes-backup-1", "from gemini"), false),
            candidate(MockCompleter::replying("hermes-backup-2", "from llama"), false),
        ])
        .unwrap();
        let hermes = ModelChain::new("hermes", chain);

        let outcome = hermes.dispatch(&[Message::user("hi")]).await;
        assert_eq!(outcome.candidate(), Some("hermes-backup-1"));
        assert_eq!(outcome.attempted(), ["hermes", "hermes-backup-1"]);

        let result = hermes.complete(&[Message::user("hi")]).await.unwrap();
        assert_eq!(result.content, "from gemini");
        assert_eq!(hermes.name(), "hermes");
    }

    #[tokio::test]
    async fn test_exhausted_chain_lists_models() {
        let chain = CandidateChain::new(vec![
            candidate(
                MockCompleter::failing("hermes", CapabilityError::Transport("reset".into())),
                true,
            ),
            candidate(
                MockCompleter::failing(
                    "hermes-backup-1",
                    CapabilityError::ProviderQuota("429".into()),
                ),
                false,
            ),
        ])
        .unwrap();
        let hermes = ModelChain::new("hermes", chain);
        assert_eq!(hermes.models(), ["hermes", "hermes-backup-1"]);
        assert_eq!(hermes.total_timeout(), Duration::from_secs(2));

        let err = hermes.complete(&[Message::user("hi")]).await.unwrap_err();
        assert_eq!(err.attempted(), ["hermes", "hermes-backup-1"]);
        assert!(matches!(err.root_cause(), CapabilityError::ProviderQuota(_)));
    }
}
