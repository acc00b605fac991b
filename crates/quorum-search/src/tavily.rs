//! Tavily search API

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use quorum_config::SearchProviderConfig;
use quorum_llm::HttpClient;
use quorum_utils::CapabilityError;

use crate::types::{SearchHit, Searcher};

#[derive(Clone)]
pub struct TavilySearcher {
    name: String,
    client: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    timeout: Duration,
}

impl TavilySearcher {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: Arc<HttpClient>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
            api_key,
            api_key_env: String::new(),
            timeout,
        }
    }

    #[must_use]
    pub fn new_from_config(config: &SearchProviderConfig, client: Arc<HttpClient>) -> Self {
        let base_url = config.base_url.clone().unwrap_or_else(|| {
            quorum_config::SearchProviderKind::Tavily
                .default_base_url()
                .to_string()
        });
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());

        let mut searcher = Self::new(&config.name, client, base_url, api_key, config.timeout());
        searcher.api_key_env = config.api_key_env.clone();
        searcher
    }

    fn parse_response(body: &[u8], max_results: usize) -> Result<Vec<SearchHit>, CapabilityError> {
        let response: TavilyResponse = serde_json::from_slice(body)
            .map_err(|e| CapabilityError::Format(format!("Failed to parse tavily response: {e}")))?;

        Ok(response
            .results
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title.unwrap_or_default(),
                url: r.url.unwrap_or_default(),
                content: r.content.unwrap_or_default(),
                relevance_score: SearchHit::normalize_score(r.score),
            })
            .collect())
    }
}

#[async_trait]
impl Searcher for TavilySearcher {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(
        &self,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, CapabilityError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(CapabilityError::ProviderAuth(format!(
                "tavily API key not found in environment variable '{}'",
                self.api_key_env
            )));
        };

        debug!(provider = "tavily", searcher = %self.name, max_results, "Performing search");

        let body = TavilyRequest {
            query,
            search_depth: "basic",
            max_results,
        };

        let request = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .json(&body);

        let response = self
            .client
            .execute_with_retry(request, self.timeout, "tavily")
            .await?;

        let bytes = response.bytes().await.map_err(|e| {
            CapabilityError::Transport(format!("Failed to read tavily response: {e}"))
        })?;

        let hits = Self::parse_response(&bytes, max_results)?;
        info!(provider = "tavily", results = hits.len(), "Search completed");
        Ok(hits)
    }
}

#[derive(Debug, Serialize)]
struct TavilyRequest<'a> {
    query: &'a str,
    search_depth: &'a str,
    max_results: usize,
}

#[derive(Debug, Deserialize)]
struct TavilyResponse {
    #[serde(default)]
    results: Vec<TavilyResult>,
}

#[derive(Debug, Deserialize)]
struct TavilyResult {
    title: Option<String>,
    url: Option<String>,
    content: Option<String>,
    score: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_response_maps_fields_and_truncates() {
        let body = br#"{
            "query": "react docs",
            "results": [
                {"title": "React", "url": "https://react.dev", "content": "The library for web UIs", "score": 0.93},
                {"title": "Old", "url": "https://legacy.reactjs.org", "content": "legacy", "score": 0.0},
                {"title": "Third", "url": "https://x", "content": "y", "score": 0.5}
            ]
        }"#;

        let hits = TavilySearcher::parse_response(body, 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].url, "https://react.dev");
        assert_eq!(hits[0].relevance_score, Some(0.93));
        assert_eq!(hits[1].relevance_score, None);
    }

    #[test]
    fn test_parse_response_without_results_is_empty() {
        let hits = TavilySearcher::parse_response(br#"{"query": "q"}"#, 5).unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn test_parse_response_rejects_non_json() {
        let err = TavilySearcher::parse_response(b"oops", 5).unwrap_err();
        assert!(matches!(err, CapabilityError::Format(_)));
    }
}
