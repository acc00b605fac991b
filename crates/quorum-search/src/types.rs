use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use quorum_utils::CapabilityError;

/// One web search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
    /// Provider relevance in `(0, 1]`; absent when the provider gives none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl SearchHit {
    /// Keep a score only when it carries information.
    #[must_use]
    pub fn normalize_score(score: Option<f64>) -> Option<f64> {
        score.filter(|s| s.is_finite() && *s > 0.0)
    }
}

/// A web search capability.
#[async_trait]
pub trait Searcher: Send + Sync {
    /// Stable name used in attempt histories and logs
    fn name(&self) -> &str;

    /// Run `query`, returning at most `max_results` hits.
    ///
    /// An empty list is a successful search with no hits.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError` for transport failures and malformed responses.
    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, CapabilityError>;
}
