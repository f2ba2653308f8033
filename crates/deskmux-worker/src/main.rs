//! Runnable specialist-worker skeleton.
//!
//! Exposes the A2A protocol surface (`/health`, `/.well-known/agent.json`,
//! `/a2a`) via `deskmux-a2a::server`, and heartbeats its registration with
//! the gateway's service registry over HTTP so the router can discover it.
//! The business handler here is a placeholder — real workers swap it for
//! whatever data source they front.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use deskmux_a2a::server::{build_agent_card, router, WorkerHandler, WorkerState};
use deskmux_a2a::types::Skill;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

/// Health-check cadence. Must stay comfortably under the registry's
/// 120-second TTL so a brief network blip doesn't expire the registration.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(45);

#[derive(Parser, Debug)]
#[command(name = "deskmux-worker", about = "A2A specialist worker skeleton")]
struct Args {
    /// Worker id, e.g. "etf-agent".
    #[arg(long)]
    agent_id: String,

    /// Address to bind the HTTP server to.
    #[arg(long, default_value = "127.0.0.1:9001")]
    bind: String,

    /// Endpoint other services should use to reach this worker, registered
    /// with the gateway (defaults to http://<bind>).
    #[arg(long)]
    endpoint: Option<String>,

    /// Base URL of the gateway's registry endpoints.
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    gateway_url: String,

    /// Comma-separated capability tags.
    #[arg(long, value_delimiter = ',', default_value = "")]
    capabilities: Vec<String>,

    /// Comma-separated desk tags.
    #[arg(long, value_delimiter = ',', default_value = "")]
    desks: Vec<String>,
}

struct PlaceholderHandler;

#[async_trait::async_trait]
impl WorkerHandler for PlaceholderHandler {
    async fn handle(&self, query: &str) -> Result<String, String> {
        Ok(format!("No business logic wired for this worker yet. Received: {query}"))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let args = Args::parse();

    let endpoint = args.endpoint.clone().unwrap_or_else(|| format!("http://{}", args.bind));
    let capabilities: Vec<String> = args.capabilities.into_iter().filter(|s| !s.is_empty()).collect();
    let desks: Vec<String> = args.desks.into_iter().filter(|s| !s.is_empty()).collect();

    let card = build_agent_card(
        &args.agent_id,
        "placeholder specialist worker",
        &endpoint,
        vec![Skill { id: args.agent_id.clone(), name: args.agent_id.clone(), description: "placeholder".to_string() }],
    );

    let state = Arc::new(WorkerState {
        agent_id: args.agent_id.clone(),
        endpoint: endpoint.clone(),
        card,
        handler: Arc::new(PlaceholderHandler),
    });

    let http_client = reqwest::Client::new();
    spawn_heartbeat(http_client.clone(), args.gateway_url.clone(), args.agent_id.clone(), endpoint.clone(), capabilities, desks);

    let listener = tokio::net::TcpListener::bind(&args.bind).await?;
    tracing::info!(agent_id = %args.agent_id, bind = %args.bind, "deskmux-worker listening");

    let shutdown_client = http_client;
    let shutdown_gateway = args.gateway_url;
    let shutdown_id = args.agent_id;

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            deregister(&shutdown_client, &shutdown_gateway, &shutdown_id).await;
        })
        .await?;

    Ok(())
}

fn spawn_heartbeat(
    client: reqwest::Client,
    gateway_url: String,
    agent_id: String,
    endpoint: String,
    capabilities: Vec<String>,
    desks: Vec<String>,
) {
    tokio::spawn(async move {
        loop {
            register_once(&client, &gateway_url, &agent_id, &endpoint, &capabilities, &desks).await;
            tokio::time::sleep(HEARTBEAT_INTERVAL).await;
        }
    });
}

/// Best-effort: a failed registration attempt is logged and retried on the
/// next heartbeat tick rather than treated as fatal.
async fn register_once(
    client: &reqwest::Client,
    gateway_url: &str,
    agent_id: &str,
    endpoint: &str,
    capabilities: &[String],
    desks: &[String],
) {
    let body = serde_json::json!({
        "id": agent_id,
        "endpoint": endpoint,
        "capabilities": capabilities,
        "desk_names": desks,
    });

    let result = client.post(format!("{gateway_url}/registry/register")).json(&body).send().await;
    match result {
        Ok(resp) if resp.status().is_success() => tracing::debug!(%agent_id, "registration heartbeat ok"),
        Ok(resp) => tracing::warn!(%agent_id, status = %resp.status(), "registration heartbeat rejected"),
        Err(e) => tracing::warn!(%agent_id, error = %e, "registration heartbeat failed"),
    }
}

async fn deregister(client: &reqwest::Client, gateway_url: &str, agent_id: &str) {
    let result = client.post(format!("{gateway_url}/registry/deregister/{agent_id}")).send().await;
    if let Err(e) = result {
        tracing::warn!(%agent_id, error = %e, "deregistration on shutdown failed");
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry().with(fmt::layer().with_target(false).with_writer(std::io::stderr)).with(filter).try_init();
}
