//! Shared application state handed to every axum handler.

use std::sync::Arc;

use deskmux_a2a::client::Resolver;
use deskmux_config::GatewayConfig;
use deskmux_registry::ServiceRegistry;
use deskmux_retriever::Retriever;
use deskmux_router::RouterLlm;
use deskmux_session::SessionStore;
use tokio::sync::{mpsc, Semaphore};

use crate::persistence::PersistJob;

pub struct AppState {
    pub config: GatewayConfig,
    pub sessions: SessionStore,
    pub registry: ServiceRegistry,
    pub retriever: Arc<Retriever>,
    pub llm: Arc<dyn RouterLlm>,
    pub http_client: reqwest::Client,
    pub pipeline_semaphore: Arc<Semaphore>,
    pub persist_tx: mpsc::Sender<PersistJob>,
}

impl AppState {
    /// The ids currently known to the registry, used to build the router's
    /// worker catalogue for this request.
    pub fn registered_ids(&self) -> Vec<String> {
        self.registry.list_all().into_iter().map(|w| w.id).collect()
    }

    /// Endpoint resolver closure: registry entry if live, else the
    /// statically configured fallback URL for that worker id.
    pub fn resolver(&self) -> Box<Resolver<'static>> {
        let registry = self.registry.clone();
        let worker_urls = self.config.a2a.worker_urls.clone();
        Box::new(move |id: &str| {
            let fallback = worker_urls.get(id).cloned().unwrap_or_default();
            registry.resolve(id, &fallback)
        })
    }
}
