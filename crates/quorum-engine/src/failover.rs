//! Ordered-candidate failover
//!
//! A [`CandidateChain`] lists interchangeable capability instances in the order they
//! should be tried. [`FailoverDispatcher::dispatch`] walks the chain, bounding each
//! invocation with the candidate's timeout, and returns on the first success. Every
//! failure, including credential rejections, moves on to the next candidate.
//!
//! The same dispatcher serves search-provider failover and a single backend's
//! backup-model list; it is generic over the capability type and the call made on it.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};

use quorum_utils::{CapabilityError, CapabilityErrorKind};

/// One named entry of a candidate chain.
pub struct Candidate<C: ?Sized> {
    name: String,
    is_primary: bool,
    capability: Arc<C>,
    timeout: Duration,
}

impl<C: ?Sized> Candidate<C> {
    pub fn new(
        name: impl Into<String>,
        is_primary: bool,
        capability: Arc<C>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            is_primary,
            capability,
            timeout,
        }
    }

    pub fn primary(name: impl Into<String>, capability: Arc<C>, timeout: Duration) -> Self {
        Self::new(name, true, capability, timeout)
    }

    pub fn backup(name: impl Into<String>, capability: Arc<C>, timeout: Duration) -> Self {
        Self::new(name, false, capability, timeout)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    #[must_use]
    pub fn capability(&self) -> &Arc<C> {
        &self.capability
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl<C: ?Sized> Clone for Candidate<C> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            is_primary: self.is_primary,
            capability: Arc::clone(&self.capability),
            timeout: self.timeout,
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for Candidate<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Candidate")
            .field("name", &self.name)
            .field("is_primary", &self.is_primary)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Non-empty, ordered list of candidates. Order is failover order.
pub struct CandidateChain<C: ?Sized> {
    candidates: Vec<Candidate<C>>,
}

impl<C: ?Sized> CandidateChain<C> {
    /// # Errors
    ///
    /// Returns `CapabilityError::Misconfiguration` for an empty list.
    pub fn new(candidates: Vec<Candidate<C>>) -> Result<Self, CapabilityError> {
        if candidates.is_empty() {
            return Err(CapabilityError::Misconfiguration(
                "candidate chain must contain at least one candidate".to_string(),
            ));
        }
        Ok(Self { candidates })
    }

    /// Chain of exactly one primary candidate.
    pub fn single(candidate: Candidate<C>) -> Self {
        Self {
            candidates: vec![candidate],
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    /// Always false for a constructed chain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Candidate<C>> {
        self.candidates.iter()
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.candidates.iter().map(|c| c.name.clone()).collect()
    }

    /// Worst-case wall time of a full walk of the chain.
    #[must_use]
    pub fn total_timeout(&self) -> Duration {
        self.candidates.iter().map(|c| c.timeout).sum()
    }
}

impl<C: ?Sized> Clone for CandidateChain<C> {
    fn clone(&self) -> Self {
        Self {
            candidates: self.candidates.clone(),
        }
    }
}

impl<C: ?Sized> std::fmt::Debug for CandidateChain<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.candidates.iter()).finish()
    }
}

/// Record of one candidate invocation
#[derive(Debug, Clone, PartialEq)]
pub struct Attempt {
    pub candidate: String,
    /// `None` when the invocation succeeded
    pub error: Option<CapabilityError>,
    pub duration_ms: u64,
}

impl Attempt {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Serializable summary of an [`Attempt`], without provider payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptSummary {
    pub candidate: String,
    pub error_kind: Option<CapabilityErrorKind>,
    pub duration_ms: u64,
}

impl From<&Attempt> for AttemptSummary {
    fn from(attempt: &Attempt) -> Self {
        Self {
            candidate: attempt.candidate.clone(),
            error_kind: attempt.error.as_ref().map(CapabilityError::kind),
            duration_ms: attempt.duration_ms,
        }
    }
}

/// Result of walking a chain. Always carries at least one attempt.
#[derive(Debug, Clone)]
pub enum DispatchOutcome<T> {
    Success {
        result: T,
        /// Name of the candidate that produced `result`; also the last attempt
        candidate: String,
        attempts: Vec<Attempt>,
    },
    Failure {
        last_error: CapabilityError,
        attempts: Vec<Attempt>,
    },
}

impl<T> DispatchOutcome<T> {
    #[must_use]
    pub fn attempts(&self) -> &[Attempt] {
        match self {
            Self::Success { attempts, .. } | Self::Failure { attempts, .. } => attempts,
        }
    }

    #[must_use]
    pub fn attempted(&self) -> Vec<String> {
        self.attempts().iter().map(|a| a.candidate.clone()).collect()
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    #[must_use]
    pub fn result(&self) -> Option<&T> {
        match self {
            Self::Success { result, .. } => Some(result),
            Self::Failure { .. } => None,
        }
    }

    /// Candidate that succeeded, if any.
    #[must_use]
    pub fn candidate(&self) -> Option<&str> {
        match self {
            Self::Success { candidate, .. } => Some(candidate),
            Self::Failure { .. } => None,
        }
    }

    #[must_use]
    pub fn error(&self) -> Option<&CapabilityError> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { last_error, .. } => Some(last_error),
        }
    }

    /// Collapse into a `Result`, turning a failure into
    /// [`CapabilityError::Exhausted`] with the ordered candidate names.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::Exhausted` when every candidate failed.
    pub fn into_result(self) -> Result<T, CapabilityError> {
        match self {
            Self::Success { result, .. } => Ok(result),
            Self::Failure {
                last_error,
                attempts,
            } => Err(CapabilityError::Exhausted {
                attempted: attempts.into_iter().map(|a| a.candidate).collect(),
                last: Box::new(last_error),
            }),
        }
    }
}

/// Walks candidate chains in order. Stateless apart from a label used in logs.
#[derive(Debug, Clone)]
pub struct FailoverDispatcher {
    label: String,
}

impl FailoverDispatcher {
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Try each candidate in order until `invoke` succeeds for one of them.
    ///
    /// `invoke` receives the candidate's capability and returns the call to make on
    /// it. Each call is bounded by the candidate's timeout; expiry is recorded as
    /// `CapabilityError::Timeout` and the walk continues. Candidates after the
    /// first success are never invoked.
    pub async fn dispatch<C, T, F, Fut>(
        &self,
        chain: &CandidateChain<C>,
        mut invoke: F,
    ) -> DispatchOutcome<T>
    where
        C: ?Sized,
        F: FnMut(Arc<C>) -> Fut,
        Fut: Future<Output = Result<T, CapabilityError>>,
    {
        let mut attempts = Vec::with_capacity(chain.len());
        let mut last_error = None;

        for candidate in chain.iter() {
            let started = Instant::now();
            let call = invoke(Arc::clone(&candidate.capability));
            let result = match tokio::time::timeout(candidate.timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(CapabilityError::Timeout {
                    duration: candidate.timeout,
                }),
            };
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            match result {
                Ok(result) => {
                    attempts.push(Attempt {
                        candidate: candidate.name.clone(),
                        error: None,
                        duration_ms,
                    });
                    if candidate.is_primary {
                        debug!(
                            chain = %self.label,
                            candidate = %candidate.name,
                            duration_ms,
                            "Candidate succeeded"
                        );
                    } else {
                        info!(
                            chain = %self.label,
                            candidate = %candidate.name,
                            attempt = attempts.len(),
                            duration_ms,
                            "Backup candidate succeeded"
                        );
                    }
                    return DispatchOutcome::Success {
                        result,
                        candidate: candidate.name.clone(),
                        attempts,
                    };
                }
                Err(error) => {
                    warn!(
                        chain = %self.label,
                        candidate = %candidate.name,
                        error_kind = %error.kind(),
                        error = %error,
                        duration_ms,
                        "Candidate failed, trying next"
                    );
                    attempts.push(Attempt {
                        candidate: candidate.name.clone(),
                        error: Some(error.clone()),
                        duration_ms,
                    });
                    last_error = Some(error);
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| {
            CapabilityError::Misconfiguration(format!("chain '{}' has no candidates", self.label))
        });
        DispatchOutcome::Failure {
            last_error,
            attempts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Minimal capability: returns its configured result and records that it ran.
    struct Probe {
        name: &'static str,
        result: Result<u32, CapabilityError>,
        delay: Duration,
        log: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Probe {
        async fn call(&self) -> Result<u32, CapabilityError> {
            self.log.lock().unwrap().push(self.name);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.result.clone()
        }
    }

    fn chain(
        specs: Vec<(&'static str, Result<u32, CapabilityError>, Duration)>,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> CandidateChain<Probe> {
        let candidates = specs
            .into_iter()
            .enumerate()
            .map(|(i, (name, result, delay))| {
                Candidate::new(
                    name,
                    i == 0,
                    Arc::new(Probe {
                        name,
                        result,
                        delay,
                        log: Arc::clone(log),
                    }),
                    Duration::from_millis(200),
                )
            })
            .collect();
        CandidateChain::new(candidates).unwrap()
    }

    fn transport(msg: &str) -> CapabilityError {
        CapabilityError::Transport(msg.to_string())
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err = CandidateChain::<Probe>::new(Vec::new()).unwrap_err();
        assert!(matches!(err, CapabilityError::Misconfiguration(_)));
    }

    #[tokio::test]
    async fn test_first_success_stops_walk() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(
            vec![
                ("tavily", Err(transport("refused")), Duration::ZERO),
                ("brave", Ok(7), Duration::ZERO),
                ("never", Ok(9), Duration::ZERO),
            ],
            &log,
        );

        let outcome = FailoverDispatcher::new("search")
            .dispatch(&chain, |probe| async move { probe.call().await })
            .await;

        assert_eq!(outcome.result(), Some(&7));
        assert_eq!(outcome.candidate(), Some("brave"));
        assert_eq!(outcome.attempted(), ["tavily", "brave"]);
        assert!(!outcome.attempts()[0].succeeded());
        assert!(outcome.attempts()[1].succeeded());
        assert_eq!(*log.lock().unwrap(), ["tavily", "brave"]);
    }

    #[tokio::test]
    async fn test_all_fail_records_every_attempt_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(
            vec![
                ("a", Err(CapabilityError::ProviderAuth("401".into())), Duration::ZERO),
                ("b", Err(CapabilityError::Format("no choices".into())), Duration::ZERO),
                ("c", Err(transport("reset")), Duration::ZERO),
            ],
            &log,
        );

        let outcome = FailoverDispatcher::new("coders")
            .dispatch(&chain, |probe| async move { probe.call().await })
            .await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.attempted(), ["a", "b", "c"]);
        assert_eq!(outcome.error(), Some(&transport("reset")));

        let err = outcome.into_result().unwrap_err();
        assert_eq!(err.attempted(), ["a", "b", "c"]);
        assert_eq!(err.root_cause(), &transport("reset"));
    }

    #[tokio::test]
    async fn test_timeout_is_failover_eligible() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = chain(
            vec![
                ("slow", Ok(1), Duration::from_secs(5)),
                ("fast", Ok(2), Duration::ZERO),
            ],
            &log,
        );

        let outcome = FailoverDispatcher::new("hermes")
            .dispatch(&chain, |probe| async move { probe.call().await })
            .await;

        assert_eq!(outcome.result(), Some(&2));
        let first = &outcome.attempts()[0];
        assert!(matches!(first.error, Some(CapabilityError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_single_candidate_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let probe = Arc::new(Probe {
            name: "claude",
            result: Ok(3),
            delay: Duration::ZERO,
            log: Arc::clone(&log),
        });
        let chain = CandidateChain::single(Candidate::primary(
            "claude",
            probe,
            Duration::from_secs(1),
        ));
        assert_eq!(chain.names(), ["claude"]);
        assert_eq!(chain.total_timeout(), Duration::from_secs(1));

        let outcome = FailoverDispatcher::new("claude")
            .dispatch(&chain, |probe| async move { probe.call().await })
            .await;
        assert_eq!(outcome.into_result().unwrap(), 3);
    }

    #[test]
    fn test_attempt_summary_hides_payload() {
        let attempt = Attempt {
            candidate: "tavily".to_string(),
            error: Some(CapabilityError::ProviderQuota("429 body".to_string())),
            duration_ms: 12,
        };
        let json = serde_json::to_value(AttemptSummary::from(&attempt)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"candidate": "tavily", "error_kind": "provider_quota", "duration_ms": 12})
        );
    }
}
