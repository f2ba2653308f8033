//! Axum router assembly: the gateway's HTTP surface.

pub mod chat;
pub mod registry;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{Json, Router};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    let max_body_bytes = state.config.http.max_body_bytes;

    Router::new()
        .route("/", get(root))
        .route("/v1/models", get(models))
        .route("/v1/chat/completions", post(chat::handler))
        .route("/registry/register", post(registry::register))
        .route("/registry/deregister/:id", post(registry::deregister))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .with_state(state)
}

async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "service": "deskmux-gateway",
        "status": "ok",
    }))
}

async fn models() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "object": "list",
        "data": [{
            "id": "agentic-ai-system",
            "object": "model",
            "owned_by": "deskmux",
        }],
    }))
}
