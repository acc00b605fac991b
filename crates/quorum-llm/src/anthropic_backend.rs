//! Anthropic Messages API backend

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use quorum_config::{BackendConfig, ProviderKind};
use quorum_utils::CapabilityError;

use crate::http_client::HttpClient;
use crate::openai_compat::HttpParams;
use crate::types::{Completer, CompletionResult, FinishReason, Message, Role};

/// Anthropic API version header value
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Clone)]
pub struct AnthropicBackend {
    name: String,
    client: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    params: HttpParams,
    timeout: Duration,
}

impl std::fmt::Debug for AnthropicBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicBackend")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl AnthropicBackend {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        client: Arc<HttpClient>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        params: HttpParams,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            base_url: base_url.into(),
            api_key,
            api_key_env: String::new(),
            model: model.into(),
            params,
            timeout,
        }
    }

    /// # Errors
    ///
    /// Returns `CapabilityError::Misconfiguration` if `config` is not an anthropic backend.
    pub fn new_from_config(
        config: &BackendConfig,
        name: &str,
        model: &str,
        client: Arc<HttpClient>,
    ) -> Result<Self, CapabilityError> {
        let kind = config
            .provider_kind()
            .map_err(|e| CapabilityError::Misconfiguration(e.to_string()))?;
        if kind != ProviderKind::Anthropic {
            return Err(CapabilityError::Misconfiguration(format!(
                "Backend '{}' uses provider '{kind}', expected anthropic",
                config.name
            )));
        }

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());

        let mut backend = Self::new(
            name,
            client,
            config.endpoint(),
            api_key,
            model,
            HttpParams {
                max_tokens: config.max_tokens,
                temperature: config.temperature,
            },
            config.timeout(),
        );
        backend.api_key_env = config.api_key_env.clone();
        Ok(backend)
    }

    /// Convert messages to Anthropic Messages API format
    ///
    /// System messages are lifted into the top-level `system` field (joined with a
    /// blank line); the remaining messages keep their order.
    fn convert_messages(messages: &[Message]) -> (Option<String>, Vec<AnthropicMessage>) {
        let mut system_prompt: Option<String> = None;
        let mut anthropic_messages = Vec::new();

        for msg in messages {
            match msg.role {
                Role::System => {
                    if let Some(existing) = system_prompt.as_mut() {
                        existing.push_str("\n\n");
                        existing.push_str(&msg.content);
                    } else {
                        system_prompt = Some(msg.content.clone());
                    }
                }
                Role::User | Role::Assistant => anthropic_messages.push(AnthropicMessage {
                    role: msg.role.as_str().to_string(),
                    content: msg.content.clone(),
                }),
            }
        }

        (system_prompt, anthropic_messages)
    }

    fn parse_response(&self, body: &[u8]) -> Result<CompletionResult, CapabilityError> {
        let response: AnthropicResponse = serde_json::from_slice(body).map_err(|e| {
            CapabilityError::Format(format!("Failed to parse anthropic response: {e}"))
        })?;

        let content: String = response
            .content
            .iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text.as_deref())
            .collect();

        if content.is_empty() {
            return Err(CapabilityError::Format(
                "anthropic response missing text content".to_string(),
            ));
        }

        let model = response.model.unwrap_or_else(|| self.model.clone());
        let mut result = CompletionResult::new(content, "anthropic", model)
            .with_finish_reason(FinishReason::from_provider(response.stop_reason.as_deref()));

        if let Some(usage) = response.usage {
            result = result.with_usage(usage.input_tokens, usage.output_tokens);
            result.cached = usage.cache_read_input_tokens.is_some_and(|n| n > 0);
        }

        Ok(result)
    }
}

#[async_trait]
impl Completer for AnthropicBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[Message]) -> Result<CompletionResult, CapabilityError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(CapabilityError::ProviderAuth(format!(
                "anthropic API key not found in environment variable '{}'",
                self.api_key_env
            )));
        };

        debug!(
            provider = "anthropic",
            backend = %self.name,
            model = %self.model,
            max_tokens = self.params.max_tokens,
            timeout_secs = self.timeout.as_secs(),
            "Invoking Anthropic backend"
        );

        let (system, anthropic_messages) = Self::convert_messages(messages);

        let request_body = AnthropicRequest {
            model: &self.model,
            messages: anthropic_messages,
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            system,
        };

        let request = self
            .client
            .post(&self.base_url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request_body);

        let response = self
            .client
            .execute_with_retry(request, self.timeout, "anthropic")
            .await?;

        let body = response.bytes().await.map_err(|e| {
            CapabilityError::Transport(format!("Failed to read anthropic response: {e}"))
        })?;

        let result = self.parse_response(&body)?;

        debug!(
            provider = "anthropic",
            backend = %self.name,
            prompt_tokens = result.usage.prompt_tokens,
            completion_tokens = result.usage.completion_tokens,
            "Completion finished"
        );

        Ok(result)
    }
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    messages: Vec<AnthropicMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    model: Option<String>,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    content_type: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u64,
    output_tokens: u64,
    cache_read_input_tokens: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_config::Config;

    fn backend() -> AnthropicBackend {
        AnthropicBackend::new(
            "claude",
            Arc::new(HttpClient::new().unwrap()),
            ProviderKind::Anthropic.default_base_url(),
            Some("k".to_string()),
            "claude-3-haiku-20240307",
            HttpParams::default(),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn test_convert_messages_lifts_system_prompts() {
        let messages = vec![
            Message::system("Task Analysis:\nbuild a parser\n\n"),
            Message::user("write it in rust"),
            Message::system("Search Information:\nnom docs\n\n"),
            Message::assistant("ok"),
        ];

        let (system, converted) = AnthropicBackend::convert_messages(&messages);

        let system = system.unwrap();
        assert!(system.starts_with("Task Analysis:"));
        assert!(system.contains("\n\nSearch Information:"));
        assert_eq!(converted.len(), 2);
        assert_eq!(converted[0].role, "user");
        assert_eq!(converted[1].role, "assistant");
    }

    #[test]
    fn test_convert_messages_without_system() {
        let (system, converted) = AnthropicBackend::convert_messages(&[Message::user("hi")]);
        assert!(system.is_none());
        assert_eq!(converted.len(), 1);
    }

    #[test]
    fn test_parse_response_joins_text_blocks() {
        let body = br#"{
            "model": "claude-3-haiku-20240307",
            "content": [
                {"type": "text", "text": "Here is "},
                {"type": "tool_use", "id": "t1"},
                {"type": "text", "text": "the code"}
            ],
            "stop_reason": "max_tokens",
            "usage": {"input_tokens": 11, "output_tokens": 4}
        }"#;

        let result = backend().parse_response(body).unwrap();
        assert_eq!(result.content, "Here is the code");
        assert_eq!(result.provider, "anthropic");
        assert_eq!(result.finish_reason, FinishReason::Length);
        assert_eq!(result.usage.completion_tokens, 4);
        assert!(!result.cached);
    }

    #[test]
    fn test_parse_response_without_text_is_format_error() {
        let err = backend()
            .parse_response(br#"{"content": []}"#)
            .unwrap_err();
        assert!(matches!(err, CapabilityError::Format(_)));
    }

    #[tokio::test]
    async fn test_missing_api_key_fails_with_provider_auth() {
        let mut config = Config::minimal_for_testing()
            .coder("claude")
            .unwrap()
            .clone();
        config.api_key_env = "QUORUM_TEST_UNSET_KEY_8f3a".to_string();

        let backend = AnthropicBackend::new_from_config(
            &config,
            "claude",
            &config.model,
            Arc::new(HttpClient::new().unwrap()),
        )
        .unwrap();

        let err = backend.complete(&[Message::user("hi")]).await.unwrap_err();
        assert!(matches!(err, CapabilityError::ProviderAuth(_)));
    }
}
