//! Directory of live specialist workers.
//!
//! Workers self-register at startup and renew on every health check; rows
//! not renewed within `TTL_SECONDS` are treated as gone. Any backend fault
//! is logged and swallowed — the router then falls back to its compiled-in
//! static description table, and `resolve` falls back to the caller's
//! configured URL.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Health-check cadence must be strictly less than this window.
pub const TTL_SECONDS: i64 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRegistration {
    pub id: String,
    pub endpoint: String,
    pub capabilities: Vec<String>,
    pub desk_names: Vec<String>,
    pub status: Status,
    pub registered_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl WorkerRegistration {
    fn is_live(&self) -> bool {
        self.status == Status::Healthy && Utc::now() <= self.expires_at
    }
}

/// Shared worker directory. Cloning shares the same underlying map.
#[derive(Clone, Default)]
pub struct ServiceRegistry {
    workers: Arc<DashMap<String, WorkerRegistration>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upsert a worker row with `status=healthy` and a fresh TTL. Idempotent.
    pub fn register(&self, id: &str, endpoint: &str, capabilities: Vec<String>, desk_names: Vec<String>) {
        let now = Utc::now();
        self.workers.insert(
            id.to_string(),
            WorkerRegistration {
                id: id.to_string(),
                endpoint: endpoint.to_string(),
                capabilities,
                desk_names,
                status: Status::Healthy,
                registered_at: now,
                expires_at: now + chrono::Duration::seconds(TTL_SECONDS),
            },
        );
    }

    /// Remove a worker row. Succeeds silently if absent.
    pub fn deregister(&self, id: &str) {
        self.workers.remove(id);
    }

    /// Point lookup. Returns `None` for rows that have expired (and evicts
    /// them as a side effect).
    pub fn discover(&self, id: &str) -> Option<WorkerRegistration> {
        match self.workers.get(id) {
            Some(entry) if entry.is_live() => Some(entry.clone()),
            Some(_) => {
                self.workers.remove(id);
                None
            }
            None => None,
        }
    }

    /// All live registrations, for the router's catalogue build.
    pub fn list_all(&self) -> Vec<WorkerRegistration> {
        self.workers.iter().filter(|entry| entry.is_live()).map(|entry| entry.value().clone()).collect()
    }

    /// Resolve a worker's endpoint, falling back to `fallback` if the
    /// registry doesn't have a live entry.
    pub fn resolve(&self, id: &str, fallback: &str) -> String {
        match self.discover(id) {
            Some(reg) => reg.endpoint,
            None => fallback.to_string(),
        }
    }

    /// Drop any row past its expiry. Intended to run on a periodic
    /// background task; registry reads already self-evict on access, so
    /// this is only needed to bound idle memory.
    pub fn sweep_expired(&self) {
        let expired: Vec<String> =
            self.workers.iter().filter(|e| !e.value().is_live()).map(|e| e.key().clone()).collect();
        for id in expired {
            self.workers.remove(&id);
        }
    }
}

/// Spawn a background task that periodically sweeps expired registrations.
/// Returns a handle the caller can drop to stop sweeping (aborts the task).
pub fn spawn_reaper(registry: ServiceRegistry, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            registry.sweep_expired();
        }
    })
}
