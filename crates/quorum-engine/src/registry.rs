//! Builds the coordinator, coder and search chains from configuration

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use quorum_config::{BackendConfig, Config};
use quorum_llm::{Completer, HttpClient, completer_for_model};
use quorum_search::{Searcher, searcher_from_config};
use quorum_utils::CapabilityError;

use crate::failover::{Candidate, CandidateChain};
use crate::fanout::NamedCompleter;
use crate::model_chain::ModelChain;

/// Slack added to a model chain's summed timeouts so the chain's own last
/// timeout is reported instead of the outer bound.
const CHAIN_GRACE: Duration = Duration::from_secs(1);

/// Every capability the orchestrator dispatches to, in configured order.
pub struct BackendRegistry {
    coordinator: NamedCompleter,
    coders: Vec<NamedCompleter>,
    search: Option<CandidateChain<dyn Searcher>>,
}

impl BackendRegistry {
    /// Assemble a registry from already-constructed capabilities.
    ///
    /// An empty `search` list disables the search stage.
    pub fn new(
        coordinator: NamedCompleter,
        coders: Vec<NamedCompleter>,
        search: Vec<Candidate<dyn Searcher>>,
    ) -> Self {
        Self {
            coordinator,
            coders,
            search: CandidateChain::new(search).ok(),
        }
    }

    /// Construct provider adapters for every configured backend and search provider.
    ///
    /// # Errors
    ///
    /// Returns `CapabilityError::Misconfiguration` if a provider kind is unknown.
    pub fn from_config(config: &Config, client: &Arc<HttpClient>) -> Result<Self, CapabilityError> {
        let coordinator = Self::backend_chain(&config.coordinator, client)?;
        let coders = config
            .coders
            .iter()
            .map(|coder| Self::backend_chain(coder, client))
            .collect::<Result<Vec<_>, _>>()?;

        let search = config
            .search
            .iter()
            .enumerate()
            .map(|(i, provider)| {
                Ok(Candidate::new(
                    provider.name.clone(),
                    i == 0,
                    searcher_from_config(provider, client)?,
                    provider.timeout(),
                ))
            })
            .collect::<Result<Vec<_>, CapabilityError>>()?;

        debug!(
            coordinator = %coordinator.name,
            coders = coders.len(),
            search_providers = search.len(),
            "Backend registry built"
        );
        Ok(Self::new(coordinator, coders, search))
    }

    /// Primary model plus backups of one backend, wrapped as a single completer.
    fn backend_chain(
        backend: &BackendConfig,
        client: &Arc<HttpClient>,
    ) -> Result<NamedCompleter, CapabilityError> {
        let timeout = backend.timeout();
        let mut candidates = vec![Candidate::primary(
            backend.name.clone(),
            completer_for_model(backend, &backend.name, &backend.model, client)?,
            timeout,
        )];
        for backup in &backend.backups {
            candidates.push(Candidate::backup(
                backup.name.clone(),
                completer_for_model(backend, &backup.name, &backup.model, client)?,
                timeout,
            ));
        }

        let chain = ModelChain::new(backend.name.clone(), CandidateChain::new(candidates)?);
        let bound = chain.total_timeout() + CHAIN_GRACE;
        let completer: Arc<dyn Completer> = Arc::new(chain);
        Ok(NamedCompleter::new(backend.name.clone(), completer, bound))
    }

    #[must_use]
    pub fn coordinator(&self) -> &NamedCompleter {
        &self.coordinator
    }

    #[must_use]
    pub fn coders(&self) -> &[NamedCompleter] {
        &self.coders
    }

    #[must_use]
    pub fn coder(&self, name: &str) -> Option<&NamedCompleter> {
        self.coders.iter().find(|c| c.name == name)
    }

    /// `None` when no search provider is configured.
    #[must_use]
    pub fn search_chain(&self) -> Option<&CandidateChain<dyn Searcher>> {
        self.search.as_ref()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("coordinator", &self.coordinator.name)
            .field(
                "coders",
                &self.coders.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            )
            .field("search", &self.search.as_ref().map(CandidateChain::names))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quorum_config::SearchProviderConfig;

    #[test]
    fn test_default_config_builds_all_chains() {
        let config = Config::minimal_for_testing();
        let client = Arc::new(HttpClient::new().unwrap());
        let registry = BackendRegistry::from_config(&config, &client).unwrap();

        assert_eq!(registry.coordinator().name, "coordinator");
        let coders: Vec<_> = registry.coders().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(coders, ["deepseek", "claude", "liquid", "hermes"]);
        assert_eq!(
            registry.search_chain().map(CandidateChain::names),
            Some(vec!["tavily".to_string(), "brave".to_string()])
        );
    }

    #[test]
    fn test_backups_extend_the_outer_timeout() {
        let config = Config::minimal_for_testing();
        let client = Arc::new(HttpClient::new().unwrap());
        let registry = BackendRegistry::from_config(&config, &client).unwrap();

        let hermes = registry.coder("hermes").unwrap();
        let hermes_config = config.coder("hermes").unwrap();
        let models = 1 + hermes_config.backups.len() as u32;
        assert_eq!(hermes.timeout, hermes_config.timeout() * models + CHAIN_GRACE);
        assert!(registry.coder("missing").is_none());
    }

    #[test]
    fn test_no_search_providers_disables_search() {
        let mut config = Config::minimal_for_testing();
        config.search.clear();
        let client = Arc::new(HttpClient::new().unwrap());
        let registry = BackendRegistry::from_config(&config, &client).unwrap();
        assert!(registry.search_chain().is_none());
    }

    #[test]
    fn test_unknown_search_provider_is_misconfiguration() {
        let mut config = Config::minimal_for_testing();
        config.search = vec![SearchProviderConfig {
            name: "bing".to_string(),
            provider: "bing".to_string(),
            api_key_env: "BING_KEY".to_string(),
            base_url: None,
            timeout_secs: 5,
        }];
        let client = Arc::new(HttpClient::new().unwrap());
        let err = BackendRegistry::from_config(&config, &client).unwrap_err();
        assert!(matches!(err, CapabilityError::Misconfiguration(_)));
    }
}
