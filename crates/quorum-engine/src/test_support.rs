//! Hand-written capability doubles for tests
//!
//! Available to this crate's tests and, with the `test-utils` feature, to
//! downstream test suites.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use quorum_llm::{Completer, CompletionResult, Message, Role};
use quorum_search::{SearchHit, Searcher};
use quorum_utils::CapabilityError;

use crate::orchestrator::prompts;

type Responder = Box<dyn Fn(&[Message]) -> Result<String, CapabilityError> + Send + Sync>;

/// Shared, ordered record of which doubles were invoked.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, name: &str) {
        if let Ok(mut calls) = self.0.lock() {
            calls.push(name.to_string());
        }
    }

    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.0.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

/// Completer whose reply is computed from the request by a closure.
pub struct MockCompleter {
    name: String,
    responder: Responder,
    delay: Duration,
    received: Mutex<Vec<Vec<Message>>>,
    log: Option<CallLog>,
}

impl MockCompleter {
    pub fn with_responder<F>(name: impl Into<String>, responder: F) -> Self
    where
        F: Fn(&[Message]) -> Result<String, CapabilityError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            responder: Box::new(responder),
            delay: Duration::ZERO,
            received: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn replying(name: impl Into<String>, reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self::with_responder(name, move |_| Ok(reply.clone()))
    }

    pub fn failing(name: impl Into<String>, error: CapabilityError) -> Self {
        Self::with_responder(name, move |_| Err(error.clone()))
    }

    /// Replies from `script` in order; once exhausted every call fails with `Format`.
    pub fn scripted(
        name: impl Into<String>,
        script: Vec<Result<String, CapabilityError>>,
    ) -> Self {
        let script = Mutex::new(VecDeque::from(script));
        Self::with_responder(name, move |_| {
            script
                .lock()
                .ok()
                .and_then(|mut s| s.pop_front())
                .unwrap_or_else(|| Err(CapabilityError::Format("script exhausted".to_string())))
        })
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.received.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Every message list this double was called with, in call order.
    #[must_use]
    pub fn received(&self) -> Vec<Vec<Message>> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Completer for MockCompleter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[Message]) -> Result<CompletionResult, CapabilityError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(messages.to_vec());
        }
        if let Some(log) = &self.log {
            log.push(&self.name);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = (self.responder)(messages)?;
        Ok(CompletionResult::new(content, "mock", &self.name).with_usage(10, 20))
    }
}

/// Canned coordinator replies, one per prompt kind.
#[derive(Debug, Clone)]
pub struct CoordinatorScript {
    pub analysis: String,
    pub summary: String,
    pub answer: String,
    pub review: String,
}

impl Default for CoordinatorScript {
    fn default() -> Self {
        Self {
            analysis: "Requirements: implement the requested feature with tests.".to_string(),
            summary: "Search summary: the docs describe the new API.".to_string(),
            answer: "Paris".to_string(),
            review: "The solution is correct.".to_string(),
        }
    }
}

impl CoordinatorScript {
    /// Script whose analysis flags the task as a simple question.
    #[must_use]
    pub fn simple_question() -> Self {
        Self {
            analysis: "SIMPLE_QUESTION".to_string(),
            ..Self::default()
        }
    }

    /// Coordinator double that recognizes which prompt it was sent.
    pub fn into_completer(self, name: impl Into<String>) -> MockCompleter {
        MockCompleter::with_responder(name, move |messages| {
            let system_has = |prefix: &str| {
                messages
                    .iter()
                    .any(|m| m.role == Role::System && m.content.starts_with(prefix))
            };
            if system_has(prompts::ANALYSIS_PREFIX) {
                Ok(self.analysis.clone())
            } else if system_has(prompts::SUMMARY_PREFIX) {
                Ok(self.summary.clone())
            } else if system_has(prompts::ANSWER_PREFIX) {
                Ok(self.answer.clone())
            } else if system_has(prompts::REVIEW_PREFIX) {
                Ok(self.review.clone())
            } else {
                Err(CapabilityError::Format(
                    "coordinator double received an unknown prompt".to_string(),
                ))
            }
        })
    }
}

/// Searcher returning fixed hits or a fixed error.
pub struct MockSearcher {
    name: String,
    result: Result<Vec<SearchHit>, CapabilityError>,
    delay: Duration,
    calls: Mutex<usize>,
    log: Option<CallLog>,
}

impl MockSearcher {
    pub fn returning(name: impl Into<String>, hits: Vec<SearchHit>) -> Self {
        Self {
            name: name.into(),
            result: Ok(hits),
            delay: Duration::ZERO,
            calls: Mutex::new(0),
            log: None,
        }
    }

    pub fn failing(name: impl Into<String>, error: CapabilityError) -> Self {
        Self {
            name: name.into(),
            result: Err(error),
            delay: Duration::ZERO,
            calls: Mutex::new(0),
            log: None,
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    #[must_use]
    pub fn with_call_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| *c).unwrap_or_default()
    }
}

#[async_trait]
impl Searcher for MockSearcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        _query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, CapabilityError> {
        if let Ok(mut calls) = self.calls.lock() {
            *calls += 1;
        }
        if let Some(log) = &self.log {
            log.push(&self.name);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result
            .clone()
            .map(|hits| hits.into_iter().take(max_results).collect())
    }
}

/// A search hit with the given title and URL.
#[must_use]
pub fn hit(title: &str, url: &str) -> SearchHit {
    SearchHit {
        title: title.to_string(),
        url: url.to_string(),
        content: format!("{title} content"),
        relevance_score: Some(0.9),
    }
}
