//! Web search providers for quorum
//!
//! Providers implement [`Searcher`]; the engine orders them into a failover chain.

mod brave;
mod tavily;
mod types;

use std::sync::Arc;

pub use brave::BraveSearcher;
pub use tavily::TavilySearcher;
pub use types::{SearchHit, Searcher};

use quorum_config::{SearchProviderConfig, SearchProviderKind};
use quorum_llm::HttpClient;
use quorum_utils::CapabilityError;

/// Construct the searcher described by one `[[search]]` entry.
///
/// # Errors
///
/// Returns `CapabilityError::Misconfiguration` for an unknown provider kind.
pub fn searcher_from_config(
    config: &SearchProviderConfig,
    client: &Arc<HttpClient>,
) -> Result<Arc<dyn Searcher>, CapabilityError> {
    let kind = config
        .provider_kind()
        .map_err(|e| CapabilityError::Misconfiguration(e.to_string()))?;

    Ok(match kind {
        SearchProviderKind::Tavily => {
            Arc::new(TavilySearcher::new_from_config(config, Arc::clone(client)))
        }
        SearchProviderKind::Brave => {
            Arc::new(BraveSearcher::new_from_config(config, Arc::clone(client)))
        }
    })
}
