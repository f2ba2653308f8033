//! Bring-up: assemble every subsystem, bind, and serve.

use std::sync::Arc;

use deskmux_config::GatewayConfig;
use deskmux_registry::ServiceRegistry;
use deskmux_retriever::Retriever;
use deskmux_router::AnthropicRouterLlm;
use deskmux_session::SessionStore;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;

use crate::error::GatewayError;
use crate::state::AppState;
use crate::{http, persistence};

const REGISTRY_SWEEP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(30);
const PERSISTENCE_QUEUE_CAPACITY: usize = 256;

/// Assemble the gateway's dependencies and serve until the process is
/// killed. Mirrors the shape of a node bring-up routine: build deps, bind,
/// `axum::serve`, block.
pub async fn run(config: GatewayConfig) -> Result<(), GatewayError> {
    let sessions = SessionStore::new(config.session.max_messages, config.session.max_msg_chars, config.session.ttl_hours as i64);
    let registry = ServiceRegistry::new();
    deskmux_registry::spawn_reaper(registry.clone(), REGISTRY_SWEEP_INTERVAL);

    let retriever = Arc::new(Retriever::with_hash_embedder());
    let llm = Arc::new(AnthropicRouterLlm::new(
        config.router.api_key.clone(),
        config.router.model.clone(),
        config.router.base_url.clone(),
    ));

    let persist_tx = persistence::spawn(sessions.clone(), PERSISTENCE_QUEUE_CAPACITY);

    let state = Arc::new(AppState {
        pipeline_semaphore: Arc::new(Semaphore::new(config.http.pipeline_concurrency)),
        http_client: reqwest::Client::new(),
        sessions,
        registry,
        retriever,
        llm,
        persist_tx,
        config,
    });

    let bind = state.config.http.bind.clone();
    let listener = TcpListener::bind(&bind).await.map_err(GatewayError::Http)?;
    tracing::info!(%bind, "deskmux-gateway listening");

    axum::serve(listener, http::router(state)).await.map_err(GatewayError::Http)?;
    Ok(())
}
