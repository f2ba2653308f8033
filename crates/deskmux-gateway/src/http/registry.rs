//! HTTP front door for the in-process service registry. Workers run as
//! separate processes, so registration/deregistration has to cross a
//! network boundary rather than a direct method call.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub id: String,
    pub endpoint: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub desk_names: Vec<String>,
}

pub async fn register(State(state): State<Arc<AppState>>, Json(req): Json<RegisterRequest>) -> Json<serde_json::Value> {
    state.registry.register(&req.id, &req.endpoint, req.capabilities, req.desk_names);
    Json(serde_json::json!({"status": "ok"}))
}

pub async fn deregister(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Json<serde_json::Value> {
    state.registry.deregister(&id);
    Json(serde_json::json!({"status": "ok"}))
}
