//! Brave web search API

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use quorum_config::SearchProviderConfig;
use quorum_llm::HttpClient;
use quorum_utils::CapabilityError;

use crate::types::{SearchHit, Searcher};

/// Brave caps `count` at 20 per request
const MAX_COUNT: usize = 20;

#[derive(Clone)]
pub struct BraveSearcher {
    name: String,
    client: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    timeout: Duration,
}

impl BraveSearcher {
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
            quorum_config::SearchProviderKind::Brave
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

    fn request_url(&self, query: &str, max_results: usize) -> Result<reqwest::Url, CapabilityError> {
        let count = max_results.clamp(1, MAX_COUNT).to_string();
        reqwest::Url::parse_with_params(&self.base_url, &[("q", query), ("count", count.as_str())])
            .map_err(|e| {
                CapabilityError::Misconfiguration(format!(
                    "Invalid brave base_url '{}': {e}",
                    self.base_url
                ))
            })
    }

    fn parse_response(body: &[u8], max_results: usize) -> Result<Vec<SearchHit>, CapabilityError> {
        let response: BraveResponse = serde_json::from_slice(body)
            .map_err(|e| CapabilityError::Format(format!("Failed to parse brave response: {e}")))?;

        Ok(response
            .web
            .map(|web| web.results)
            .unwrap_or_default()
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title.unwrap_or_default(),
                url: r.url.unwrap_or_default(),
                content: r.description.unwrap_or_default(),
                relevance_score: None,
            })
            .collect())
    }
}

#[async_trait]
impl Searcher for BraveSearcher {
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
                "brave API key not found in environment variable '{}'",
                self.api_key_env
            )));
        };

        debug!(provider = "brave", searcher = %self.name, max_results, "Performing search");

        let url = self.request_url(query, max_results)?;
        let request = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .header("X-Subscription-Token", api_key);

        let response = self
            .client
            .execute_with_retry(request, self.timeout, "brave")
            .await?;

        let bytes = response.bytes().await.map_err(|e| {
            CapabilityError::Transport(format!("Failed to read brave response: {e}"))
        })?;

        let hits = Self::parse_response(&bytes, max_results)?;
        info!(provider = "brave", results = hits.len(), "Search completed");
        Ok(hits)
    }
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    title: Option<String>,
    url: Option<String>,
    description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn searcher() -> BraveSearcher {
        BraveSearcher::new(
            "brave",
            Arc::new(HttpClient::new().unwrap()),
            "https://api.search.brave.com/res/v1/web/search",
            Some("k".to_string()),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_request_url_encodes_query_and_count() {
        let url = searcher().request_url("latest react & hooks", 50).unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert_eq!(
            pairs,
            vec![
                ("q".to_string(), "latest react & hooks".to_string()),
                ("count".to_string(), "20".to_string()),
            ]
        );
    }

    #[test]
    fn test_parse_response_reads_web_results_description() {
        let body = br#"{
            "type": "search",
            "web": {"results": [
                {"title": "React Docs", "url": "https://react.dev/learn", "description": "Learn React"}
            ]}
        }"#;

        let hits = BraveSearcher::parse_response(body, 5).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Learn React");
        assert_eq!(hits[0].relevance_score, None);
    }

    #[test]
    fn test_parse_response_without_web_section_is_empty() {
        let hits = BraveSearcher::parse_response(br#"{"type": "search"}"#, 5).unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_missing_key_is_provider_auth() {
        let searcher = BraveSearcher::new(
            "brave",
            Arc::new(HttpClient::new().unwrap()),
            "https://api.search.brave.com/res/v1/web/search",
            None,
            Duration::from_secs(5),
        );
        let err = searcher.search("q", 3).await.unwrap_err();
        assert!(matches!(err, CapabilityError::ProviderAuth(_)));
    }
}
