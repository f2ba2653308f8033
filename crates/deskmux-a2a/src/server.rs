//! Worker-side A2A server skeleton: the uniform HTTP surface every
//! specialist worker exposes. Business logic is injected as a handler
//! closure; this module owns only the protocol plumbing.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;

use crate::types::{AgentCapabilities, AgentCard, HealthResponse, Skill, Task, TaskResult};

/// A worker's business handler: takes the first text part of an inbound
/// task and returns the answer text. Synchronous business logic for
/// individual workers is out of scope here — this trait is the seam.
#[async_trait::async_trait]
pub trait WorkerHandler: Send + Sync {
    async fn handle(&self, query: &str) -> Result<String, String>;
}

pub struct WorkerState {
    pub agent_id: String,
    pub endpoint: String,
    pub card: AgentCard,
    pub handler: Arc<dyn WorkerHandler>,
}

pub fn build_agent_card(agent_id: &str, description: &str, endpoint: &str, skills: Vec<Skill>) -> AgentCard {
    AgentCard {
        name: agent_id.to_string(),
        description: description.to_string(),
        url: endpoint.to_string(),
        version: "1.0.0".to_string(),
        capabilities: AgentCapabilities { streaming: false, push_notifications: false },
        skills,
    }
}

pub fn router(state: Arc<WorkerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/.well-known/agent.json", get(agent_card))
        .route("/a2a", post(handle_task))
        .with_state(state)
}

async fn health(State(state): State<Arc<WorkerState>>) -> Json<HealthResponse> {
    // Side effect: in a full deployment this renews the registry TTL. The
    // registration call itself lives in the gateway binary that wires this
    // skeleton up, not in the protocol plumbing here.
    Json(HealthResponse { status: "ok".to_string(), agent_id: state.agent_id.clone(), endpoint: state.endpoint.clone() })
}

async fn agent_card(State(state): State<Arc<WorkerState>>) -> Json<AgentCard> {
    Json(state.card.clone())
}

async fn handle_task(State(state): State<Arc<WorkerState>>, Json(task): Json<Task>) -> Json<TaskResult> {
    let query = task.message.parts.first().map(|p| p.text.as_str()).unwrap_or_default();

    let result = match state.handler.handle(query).await {
        Ok(text) => TaskResult::completed(task.id, text),
        Err(e) => TaskResult::failed(task.id, e),
    };
    Json(result)
}
