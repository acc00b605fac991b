//! Shared HTTP client infrastructure for HTTP-based providers
//!
//! One `reqwest::Client` is built per process and shared by every completion and
//! search adapter, with timeout and retry policies applied per request.

use quorum_utils::CapabilityError;
use quorum_utils::redaction::redact_error_message;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

/// Default maximum HTTP timeout (5 minutes)
const DEFAULT_MAX_HTTP_TIMEOUT: Duration = Duration::from_secs(300);

/// Default connect timeout (30 seconds)
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retry attempts for 5xx and network failures
const MAX_RETRIES: u32 = 2;

/// Initial backoff duration for retries (1 second)
const INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Shared HTTP client for providers
///
/// - Connection reuse across adapters
/// - Per-request timeout capped by a process-wide maximum
/// - Retry with linear backoff for 5xx and network failures
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    max_timeout: Duration,
    max_retries: u32,
    initial_backoff: Duration,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_timeout", &self.max_timeout)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client with default configuration
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::Misconfiguration` if the client cannot be constructed
    pub fn new() -> Result<Self, CapabilityError> {
        Self::with_max_timeout(DEFAULT_MAX_HTTP_TIMEOUT)
    }

    /// Create a new HTTP client with a custom maximum timeout
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::Misconfiguration` if the client cannot be constructed
    pub fn with_max_timeout(max_timeout: Duration) -> Result<Self, CapabilityError> {
        let client = Client::builder()
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(|e| {
                CapabilityError::Misconfiguration(format!("Failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            max_timeout,
            max_retries: MAX_RETRIES,
            initial_backoff: INITIAL_BACKOFF,
        })
    }

    /// Override the retry policy. Zero retries makes every request single-shot.
    #[must_use]
    pub fn with_retry_policy(mut self, max_retries: u32, initial_backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_backoff = initial_backoff;
        self
    }

    #[must_use]
    pub fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    /// Start a POST request on the shared client
    #[must_use]
    pub fn post(&self, url: impl reqwest::IntoUrl) -> RequestBuilder {
        self.client.post(url)
    }

    /// Start a GET request on the shared client
    #[must_use]
    pub fn get(&self, url: impl reqwest::IntoUrl) -> RequestBuilder {
        self.client.get(url)
    }

    /// Execute an HTTP request with timeout and retry policy
    ///
    /// - Per-request timeout: `min(request_timeout, max_timeout)`
    /// - Up to `max_retries` retries for 5xx and network failures, backoff 1s, 2s, ...
    /// - No retries for 4xx errors
    ///
    /// # Errors
    ///
    /// - `ProviderAuth` for 401/403
    /// - `ProviderQuota` for 429
    /// - `ProviderOutage` for 5xx (after retries)
    /// - `Timeout` when the request exceeds its time bound
    /// - `Transport` for other 4xx and network errors (after retries)
    pub async fn execute_with_retry(
        &self,
        request_builder: RequestBuilder,
        request_timeout: Duration,
        provider_name: &str,
    ) -> Result<Response, CapabilityError> {
        let effective_timeout = request_timeout.min(self.max_timeout);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let request = request_builder
                .try_clone()
                .ok_or_else(|| {
                    CapabilityError::Transport("Failed to clone request for retry".to_string())
                })?
                .timeout(effective_timeout)
                .build()
                .map_err(|e| {
                    CapabilityError::Transport(format!(
                        "Failed to build request: {}",
                        redact_error_message(&e.to_string())
                    ))
                })?;

            debug!(
                provider = provider_name,
                attempt,
                timeout_secs = effective_timeout.as_secs(),
                "Executing HTTP request"
            );

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();

                    if status.is_client_error() {
                        return Err(map_client_error(status, provider_name));
                    }

                    if status.is_server_error() {
                        if attempt <= self.max_retries {
                            warn!(
                                provider = provider_name,
                                attempt,
                                status = status.as_u16(),
                                "Server error, will retry"
                            );
                            tokio::time::sleep(self.initial_backoff * attempt).await;
                            continue;
                        }

                        return Err(CapabilityError::ProviderOutage(format!(
                            "{provider_name} returned server error: {status}"
                        )));
                    }

                    return Ok(response);
                }
                Err(e) => {
                    if e.is_timeout() {
                        return Err(CapabilityError::Timeout {
                            duration: effective_timeout,
                        });
                    }

                    let redacted = redact_error_message(&e.to_string());

                    if attempt <= self.max_retries {
                        warn!(
                            provider = provider_name,
                            attempt,
                            error = %redacted,
                            "Network error, will retry"
                        );
                        tokio::time::sleep(self.initial_backoff * attempt).await;
                        continue;
                    }

                    return Err(CapabilityError::Transport(format!(
                        "{provider_name} request failed: {redacted}"
                    )));
                }
            }
        }
    }
}

/// Map HTTP client error status codes to `CapabilityError` variants
///
/// - 401/403 → `ProviderAuth`
/// - 429 → `ProviderQuota`
/// - Other 4xx → `Transport`
pub(crate) fn map_client_error(status: StatusCode, provider_name: &str) -> CapabilityError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CapabilityError::ProviderAuth(
            format!("{provider_name} authentication failed: {status}"),
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            CapabilityError::ProviderQuota(format!("{provider_name} rate limit exceeded: {status}"))
        }
        _ => CapabilityError::Transport(format!(
            "{provider_name} returned client error: {status}"
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_client_construction() {
        let client = HttpClient::new();
        assert!(client.is_ok(), "Should construct HTTP client successfully");
    }

    #[test]
    fn test_http_client_with_custom_timeout() {
        let custom_timeout = Duration::from_secs(60);
        let client = HttpClient::with_max_timeout(custom_timeout).unwrap();
        assert_eq!(client.max_timeout(), custom_timeout);
    }

    #[test]
    fn test_map_401_and_403_to_provider_auth() {
        for status in [StatusCode::UNAUTHORIZED, StatusCode::FORBIDDEN] {
            match map_client_error(status, "test-provider") {
                CapabilityError::ProviderAuth(msg) => {
                    assert!(msg.contains("test-provider"));
                    assert!(msg.contains(&status.as_u16().to_string()));
                }
                other => panic!("Expected ProviderAuth for {status}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_map_429_to_provider_quota() {
        let error = map_client_error(StatusCode::TOO_MANY_REQUESTS, "test-provider");
        match error {
            CapabilityError::ProviderQuota(msg) => {
                assert!(msg.contains("429"));
                assert!(msg.contains("rate limit"));
            }
            other => panic!("Expected ProviderQuota for 429, got {other:?}"),
        }
    }

    #[test]
    fn test_map_other_4xx_to_transport() {
        for status in [
            StatusCode::BAD_REQUEST,
            StatusCode::NOT_FOUND,
            StatusCode::UNPROCESSABLE_ENTITY,
        ] {
            let error = map_client_error(status, "test-provider");
            assert!(
                matches!(error, CapabilityError::Transport(ref msg) if msg.contains("client error")),
                "Expected Transport for {status}, got {error:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = HttpClient::new()
            .unwrap()
            .with_retry_policy(0, Duration::from_millis(1));

        // Port 9 (discard) on loopback is essentially never listening.
        let request = client.get("http://127.0.0.1:9/");
        let err = client
            .execute_with_retry(request, Duration::from_secs(5), "loopback")
            .await
            .unwrap_err();

        assert!(
            err.is_transport(),
            "Expected a transport-family error, got {err:?}"
        );
    }
}
