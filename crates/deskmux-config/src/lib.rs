//! Layered configuration for the financial query dispatcher gateway.
//!
//! Mirrors the YAML deep-merge loader used across the workspace: system
//! config, then user config, then a workspace-local file, then an explicit
//! `--config` path, each layer overriding scalars from the previous one.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Fixed registry TTL. Not configurable — heartbeat cadence must stay well
/// under this window, and letting it vary per-deployment invites a registry
/// whose entries expire before any health check can renew them.
pub const REGISTRY_TTL_SECONDS: u64 = 120;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_hours: u64,
    pub max_messages: usize,
    pub max_msg_chars: usize,
    pub table: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_hours: 24,
            max_messages: 20,
            max_msg_chars: 1000,
            table: "deskmux-sessions".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub table: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { table: "deskmux-agent-registry".to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    pub top_k: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct A2aConfig {
    pub timeout_secs: u64,
    /// Per-worker fallback URL, used when the registry can't resolve an id.
    pub worker_urls: std::collections::BTreeMap<String, String>,
}

impl Default for A2aConfig {
    fn default() -> Self {
        Self { timeout_secs: 120, worker_urls: Default::default() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub max_body_bytes: usize,
    pub pipeline_concurrency: usize,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            max_body_bytes: 4 * 1024 * 1024,
            pipeline_concurrency: 8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            model: "claude-haiku-4-5".to_string(),
            base_url: "https://api.anthropic.com/v1/messages".to_string(),
            api_key: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    pub http: HttpConfig,
    pub session: SessionConfig,
    pub registry: RegistryConfig,
    pub rag: RagConfig,
    pub a2a: A2aConfig,
    pub router: RouterConfig,
}

impl GatewayConfig {
    pub fn a2a_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.a2a.timeout_secs)
    }
}

// ── Search paths ──────────────────────────────────────────────────────────

fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    paths.push(PathBuf::from("/etc/deskmux/gateway.yaml"));

    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/deskmux/gateway.yaml"));
    }
    if let Some(cfg_dir) = dirs::config_dir() {
        paths.push(cfg_dir.join("deskmux/gateway.yaml"));
    }

    paths.push(PathBuf::from(".deskmux/gateway.yaml"));

    paths
}

fn merge_yaml(dst: &mut serde_yaml::Value, src: serde_yaml::Value) {
    match (dst, src) {
        (serde_yaml::Value::Mapping(dst_map), serde_yaml::Value::Mapping(src_map)) => {
            for (k, v) in src_map {
                match dst_map.get_mut(&k) {
                    Some(existing) => merge_yaml(existing, v),
                    None => {
                        dst_map.insert(k, v);
                    }
                }
            }
        }
        (dst_slot, src_val) => {
            *dst_slot = src_val;
        }
    }
}

/// Load the gateway config, merging every layer that exists on disk.
///
/// `extra` is an explicit path (e.g. from `--config`) applied last, so it
/// wins over every discovered layer.
pub fn load(extra: Option<&Path>) -> anyhow::Result<GatewayConfig> {
    let mut merged = serde_yaml::Value::Mapping(Default::default());
    let mut any_found = false;

    for path in config_search_paths() {
        if let Ok(text) = std::fs::read_to_string(&path) {
            match serde_yaml::from_str::<serde_yaml::Value>(&text) {
                Ok(layer) => {
                    merge_yaml(&mut merged, layer);
                    any_found = true;
                }
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to parse config layer"),
            }
        }
    }

    if let Some(path) = extra {
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let layer: serde_yaml::Value = serde_yaml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        merge_yaml(&mut merged, layer);
        any_found = true;
    }

    if !any_found {
        return Ok(GatewayConfig::default());
    }

    let config: GatewayConfig = serde_yaml::from_value(merged)?;
    Ok(config)
}
