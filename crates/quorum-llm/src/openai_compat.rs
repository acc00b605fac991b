//! OpenAI-compatible chat completions backend
//!
//! Serves OpenAI itself, DeepSeek and OpenRouter. They share one request and
//! response schema; OpenRouter additionally wants attribution headers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use quorum_config::{BackendConfig, ProviderKind};
use quorum_utils::CapabilityError;

use crate::http_client::HttpClient;
use crate::types::{Completer, CompletionResult, FinishReason, Message};

/// HTTP-Referer sent to OpenRouter
const OPENROUTER_REFERER: &str = "http://localhost:3000";

/// X-Title sent to OpenRouter
const OPENROUTER_TITLE: &str = "quorum";

/// Sampling parameters sent with every request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HttpParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for HttpParams {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.7,
        }
    }
}

/// Backend for any endpoint speaking the OpenAI chat completions schema
#[derive(Clone)]
pub struct OpenAiCompatibleBackend {
    name: String,
    kind: ProviderKind,
    client: Arc<HttpClient>,
    base_url: String,
    api_key: Option<String>,
    api_key_env: String,
    model: String,
    params: HttpParams,
    timeout: Duration,
}

impl std::fmt::Debug for OpenAiCompatibleBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleBackend")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl OpenAiCompatibleBackend {
    /// Create a backend from explicit parts.
    ///
    /// A `None` key is accepted; every call then fails with `ProviderAuth` so the
    /// dispatcher can fail over instead of the whole process refusing to start.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        kind: ProviderKind,
        client: Arc<HttpClient>,
        base_url: impl Into<String>,
        api_key: Option<String>,
        model: impl Into<String>,
        params: HttpParams,
        timeout: Duration,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            client,
            base_url: base_url.into(),
            api_key,
            api_key_env: String::new(),
            model: model.into(),
            params,
            timeout,
        }
    }

    /// Create a backend for `model` using the endpoint and credentials of `config`.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::Misconfiguration` if the provider is not
    /// OpenAI-compatible or is unknown.
    pub fn new_from_config(
        config: &BackendConfig,
        name: &str,
        model: &str,
        client: Arc<HttpClient>,
    ) -> Result<Self, CapabilityError> {
        let kind = config
            .provider_kind()
            .map_err(|e| CapabilityError::Misconfiguration(e.to_string()))?;

        if kind == ProviderKind::Anthropic {
            return Err(CapabilityError::Misconfiguration(format!(
                "Backend '{}' uses the anthropic provider, which is not OpenAI-compatible",
                config.name
            )));
        }

        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.is_empty());

        let mut backend = Self::new(
            name,
            kind,
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

    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Convert messages to OpenAI-compatible format
    fn convert_messages(messages: &[Message]) -> Vec<OpenAiMessage> {
        messages
            .iter()
            .map(|msg| OpenAiMessage {
                role: msg.role.as_str().to_string(),
                content: msg.content.clone(),
            })
            .collect()
    }

    /// Turn a raw response body into a normalized result.
    fn parse_response(&self, body: &[u8]) -> Result<CompletionResult, CapabilityError> {
        let response: ChatResponse = serde_json::from_slice(body).map_err(|e| {
            CapabilityError::Format(format!("Failed to parse {} response: {e}", self.kind))
        })?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            CapabilityError::Format(format!("{} response missing choices[0]", self.kind))
        })?;

        let content = choice.message.content.ok_or_else(|| {
            CapabilityError::Format(format!(
                "{} response missing content in choices[0]",
                self.kind
            ))
        })?;

        let model = response.model.unwrap_or_else(|| self.model.clone());
        let mut result = CompletionResult::new(content, self.kind.as_ref(), model)
            .with_finish_reason(FinishReason::from_provider(choice.finish_reason.as_deref()));

        if let Some(usage) = response.usage {
            result = result.with_usage(usage.prompt_tokens, usage.completion_tokens);
            result.cached = usage
                .prompt_tokens_details
                .and_then(|d| d.cached_tokens)
                .is_some_and(|n| n > 0);
        }

        Ok(result)
    }
}

#[async_trait]
impl Completer for OpenAiCompatibleBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, messages: &[Message]) -> Result<CompletionResult, CapabilityError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(CapabilityError::ProviderAuth(format!(
                "{} API key not found in environment variable '{}'",
                self.kind, self.api_key_env
            )));
        };

        debug!(
            provider = %self.kind,
            backend = %self.name,
            model = %self.model,
            max_tokens = self.params.max_tokens,
            temperature = self.params.temperature,
            timeout_secs = self.timeout.as_secs(),
            "Invoking OpenAI-compatible backend"
        );

        let request_body = ChatRequest {
            model: &self.model,
            messages: Self::convert_messages(messages),
            max_tokens: self.params.max_tokens,
            temperature: self.params.temperature,
            stream: false,
        };

        let mut request = self
            .client
            .post(&self.base_url)
            .bearer_auth(api_key)
            .header("Content-Type", "application/json")
            .json(&request_body);

        if self.kind == ProviderKind::OpenRouter {
            request = request
                .header("HTTP-Referer", OPENROUTER_REFERER)
                .header("X-Title", OPENROUTER_TITLE);
        }

        let response = self
            .client
            .execute_with_retry(request, self.timeout, self.kind.as_ref())
            .await?;

        let body = response.bytes().await.map_err(|e| {
            CapabilityError::Transport(format!("Failed to read {} response: {e}", self.kind))
        })?;

        let result = self.parse_response(&body)?;

        debug!(
            provider = %self.kind,
            backend = %self.name,
            prompt_tokens = result.usage.prompt_tokens,
            completion_tokens = result.usage.completion_tokens,
            "Completion finished"
        );

        Ok(result)
    }
}

/// OpenAI-compatible message format for requests
#[derive(Debug, Clone, Serialize)]
struct OpenAiMessage {
    role: String,
    content: String,
}

/// Request body (OpenAI-compatible)
#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

/// Response body (OpenAI-compatible)
#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<ResponseUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
    prompt_tokens_details: Option<PromptTokensDetails>,
}

#[derive(Debug, Deserialize)]
struct PromptTokensDetails {
    cached_tokens: Option<u64>,
}
