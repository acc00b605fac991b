//! OpenAI-compatible HTTP surface
//!
//! `POST /chat/completions` (also under `/v1`) runs the orchestrator for the agent
//! model and passes directly addressed models to their backend chain. Responses are
//! either one `chat.completion` body or a server-sent event stream of
//! `chat.completion.chunk` frames.

mod auth;
mod handlers;
pub mod wire;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use quorum_config::{Config, ServerConfig};
use quorum_engine::{BackendRegistry, TaskOrchestrator};
use quorum_llm::HttpClient;
use quorum_memory::open_store;

use crate::error::QuorumError;

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: TaskOrchestrator,
    pub server: Arc<ServerConfig>,
    /// Bearer key clients must present; `None` disables authentication
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(orchestrator: TaskOrchestrator, server: ServerConfig, api_key: Option<String>) -> Self {
        Self {
            orchestrator,
            server: Arc::new(server),
            api_key: api_key.map(Arc::from),
        }
    }

    /// Build backends, memory and the orchestrator from configuration.
    ///
    /// The API key is read from the env var named by `[server] api_key_env`.
    ///
    /// # Errors
    ///
    /// Returns an error if a backend cannot be constructed or the memory store
    /// cannot be opened.
    pub fn from_config(config: &Config) -> Result<Self, QuorumError> {
        let client = Arc::new(HttpClient::new()?);
        let registry = Arc::new(BackendRegistry::from_config(config, &client)?);
        let memory = open_store(&config.memory)?;
        let orchestrator = TaskOrchestrator::new(registry, memory, config.orchestrator.clone());

        let api_key = std::env::var(&config.server.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty());
        if api_key.is_none() {
            warn!(
                env = %config.server.api_key_env,
                "No API key configured; accepting unauthenticated requests"
            );
        }

        Ok(Self::new(orchestrator, config.server.clone(), api_key))
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/chat/completions", post(handlers::chat_completions))
        .route("/v1/chat/completions", post(handlers::chat_completions))
        .route("/v1/models", get(handlers::list_models))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind the first free port in `[port, port + attempts)`.
///
/// # Errors
///
/// Returns `QuorumError::Server` if every port in the range is taken.
pub async fn bind_first_available(
    host: &str,
    port: u16,
    attempts: u16,
) -> Result<TcpListener, QuorumError> {
    let attempts = attempts.max(1);
    let mut last_error = None;

    for offset in 0..attempts {
        let Some(candidate) = port.checked_add(offset) else {
            break;
        };
        match TcpListener::bind((host, candidate)).await {
            Ok(listener) => {
                if offset > 0 {
                    info!(requested = port, bound = candidate, "Requested port busy, using next free port");
                }
                return Ok(listener);
            }
            Err(e) => {
                debug!(port = candidate, error = %e, "Port unavailable");
                last_error = Some(e);
            }
        }
    }

    let reason = last_error.map_or_else(|| "port range overflows".to_string(), |e| e.to_string());
    Err(QuorumError::Server(format!(
        "no free port in {port}..{} on {host}: {reason}",
        port.saturating_add(attempts)
    )))
}

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Returns `QuorumError::Server` if no port can be bound or the server fails.
pub async fn serve(state: AppState) -> Result<(), QuorumError> {
    let listener = bind_first_available(
        &state.server.host,
        state.server.port,
        state.server.port_search_attempts,
    )
    .await?;
    let addr = listener
        .local_addr()
        .map_err(|e| QuorumError::Server(e.to_string()))?;
    info!(%addr, model = %state.server.agent_model, "quorum server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| QuorumError::Server(e.to_string()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutting down");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_busy_port_falls_through_to_next() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        if port > u16::MAX - 20 {
            return;
        }

        let listener = bind_first_available("127.0.0.1", port, 20).await.unwrap();
        let bound = listener.local_addr().unwrap().port();
        assert!(bound > port && bound < port + 20);
    }

    #[tokio::test]
    async fn test_exhausted_port_range_is_server_error() {
        let taken = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();

        let err = bind_first_available("127.0.0.1", port, 1).await.unwrap_err();
        assert!(matches!(err, QuorumError::Server(_)));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
