//! Completion backends for quorum
//!
//! Every provider implements the [`Completer`] trait so the engine can dispatch,
//! fail over and fan out without knowing which vendor sits behind a name.

mod anthropic_backend;
mod http_client;
mod openai_compat;
mod types;

use std::sync::Arc;

pub use anthropic_backend::AnthropicBackend;
pub use http_client::HttpClient;
pub use openai_compat::{HttpParams, OpenAiCompatibleBackend};
pub use types::{Completer, CompletionResult, FinishReason, Message, Role, Usage};

pub use quorum_utils::CapabilityError;

use quorum_config::{BackendConfig, ProviderKind};

/// Construct the completer for one model of a configured backend.
///
/// `name` is the candidate name recorded in attempt histories; `model` is the
/// primary model or one of the backend's backups.
///
/// # Errors
///
/// Returns `CapabilityError::Misconfiguration` if the provider kind is unknown.
pub fn completer_for_model(
    config: &BackendConfig,
    name: &str,
    model: &str,
    client: &Arc<HttpClient>,
) -> Result<Arc<dyn Completer>, CapabilityError> {
    let kind = config
        .provider_kind()
        .map_err(|e| CapabilityError::Misconfiguration(e.to_string()))?;

    match kind {
        ProviderKind::Anthropic => Ok(Arc::new(AnthropicBackend::new_from_config(
            config,
            name,
            model,
            Arc::clone(client),
        )?)),
        ProviderKind::OpenAi | ProviderKind::DeepSeek | ProviderKind::OpenRouter => {
            Ok(Arc::new(OpenAiCompatibleBackend::new_from_config(
                config,
                name,
                model,
                Arc::clone(client),
            )?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_config::Config;

    #[test]
    fn test_completer_for_every_default_backend() {
        let config = Config::minimal_for_testing();
        let client = Arc::new(HttpClient::new().unwrap());

        for coder in &config.coders {
            let completer = completer_for_model(coder, &coder.name, &coder.model, &client).unwrap();
            assert_eq!(completer.name(), coder.name);
        }

        let coordinator = completer_for_model(
            &config.coordinator,
            "coordinator",
            &config.coordinator.model,
            &client,
        )
        .unwrap();
        assert_eq!(coordinator.name(), "coordinator");
    }

    #[test]
    fn test_unknown_provider_is_misconfiguration() {
        let mut backend = Config::minimal_for_testing().coders[0].clone();
        backend.provider = "gemini-cli".to_string();
        let client = Arc::new(HttpClient::new().unwrap());

        let err = completer_for_model(&backend, "x", "y", &client).err().unwrap();
        assert!(matches!(err, CapabilityError::Misconfiguration(_)));
    }
}
