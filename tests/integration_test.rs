//! End-to-end HTTP tests for the gateway: request in, JSON response out,
//! exercised through the real axum router via `tower::ServiceExt::oneshot`
//! rather than against any individual crate's internals.

use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use deskmux_config::GatewayConfig;
use deskmux_gateway::persistence::PersistJob;
use deskmux_gateway::{http, AppState};
use deskmux_registry::ServiceRegistry;
use deskmux_retriever::Retriever;
use deskmux_router::RouterLlm;
use deskmux_session::SessionStore;
use tokio::sync::{mpsc, Semaphore};
use tower::ServiceExt;

/// Records every prompt it was asked to complete and plays back scripted
/// responses in order (the last response repeats once the script runs out).
struct ScriptedLlm {
    script: Mutex<Vec<String>>,
    seen_prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLlm {
    fn new(script: Vec<&str>) -> (Self, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Self { script: Mutex::new(script.into_iter().map(|s| s.to_string()).collect()), seen_prompts: seen.clone() },
            seen,
        )
    }
}

#[async_trait::async_trait]
impl RouterLlm for ScriptedLlm {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, String> {
        self.seen_prompts.lock().unwrap().push(user.to_string());
        let mut script = self.script.lock().unwrap();
        if script.len() > 1 {
            Ok(script.remove(0))
        } else {
            Ok(script.first().cloned().unwrap_or_default())
        }
    }
}

fn build_state(llm: Arc<dyn RouterLlm>, worker_urls: &[(&str, &str)]) -> Arc<AppState> {
    let mut config = GatewayConfig::default();
    for (id, url) in worker_urls {
        config.a2a.worker_urls.insert(id.to_string(), url.to_string());
    }
    config.a2a.timeout_secs = 1;

    let (tx, mut rx) = mpsc::channel::<PersistJob>(16);
    let sessions = SessionStore::default();
    let sessions_for_drain = sessions.clone();
    tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            sessions_for_drain.append(&job.session_id, &job.user_text, &job.assistant_text, &job.user_id, &job.desk_name);
        }
    });

    Arc::new(AppState {
        config,
        sessions,
        registry: ServiceRegistry::new(),
        retriever: Arc::new(Retriever::with_hash_embedder()),
        llm,
        http_client: reqwest::Client::new(),
        pipeline_semaphore: Arc::new(Semaphore::new(8)),
        persist_tx: tx,
    })
}

async fn post_chat(state: Arc<AppState>, body: serde_json::Value) -> serde_json::Value {
    let app = http::router(state);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(serde_json::to_vec(&body).unwrap()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn chat_request(messages: Vec<(&str, &str)>, session_id: Option<&str>) -> serde_json::Value {
    serde_json::json!({
        "model": "agentic-ai-system",
        "messages": messages.into_iter().map(|(role, content)| serde_json::json!({"role": role, "content": content})).collect::<Vec<_>>(),
        "session_id": session_id,
        "user": "T_HY_001",
        "desk_name": "HY",
    })
}

// Scenario 1: an empty query short-circuits to the canonical error text.
#[tokio::test]
async fn empty_query_returns_error_response() {
    let (llm, _) = ScriptedLlm::new(vec!["irrelevant"]);
    let state = build_state(Arc::new(llm), &[]);

    let response = post_chat(state, chat_request(vec![("user", "   ")], None)).await;
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert_eq!(content, "Error: Empty query received.");
}

// Scenario 2: a general query on a returning session sees its prior turn
// rendered into the prompt handed to the research pass.
#[tokio::test]
async fn general_query_carries_session_history_into_the_next_turn() {
    let (llm, seen) = ScriptedLlm::new(vec!["first finding", "first answer", "second finding", "second answer"]);
    let state = build_state(Arc::new(llm), &[]);

    let first = post_chat(state.clone(), chat_request(vec![("user", "What is a state machine?")], None)).await;
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert_eq!(first["choices"][0]["message"]["content"], "first answer");

    // Give the fire-and-forget persistence task a moment to land the turn.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let _second = post_chat(state, chat_request(vec![("user", "And what about a pushdown automaton?")], Some(&session_id))).await;

    let prompts = seen.lock().unwrap();
    let research_prompt = prompts.iter().find(|p| p.contains("pushdown automaton")).expect("second research prompt recorded");
    assert!(research_prompt.contains("[Conversation History"));
    assert!(research_prompt.contains("What is a state machine?"));
}

// Scenario 3: a financial query naming two agents merges both sections,
// in the order the router returned them, even though neither worker is
// actually reachable.
#[tokio::test]
async fn financial_query_with_two_agents_merges_both_sections_in_order() {
    let (llm, _) = ScriptedLlm::new(vec![r#"{"agents": ["etf-agent", "portfolio-agent"], "strategy": "parallel"}"#]);
    let state = build_state(Arc::new(llm), &[("etf-agent", "http://127.0.0.1:1"), ("portfolio-agent", "http://127.0.0.1:1")]);

    let response = post_chat(state, chat_request(vec![("user", "exposure en HY bonds y flujos de ETFs")], None)).await;
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.contains("## Etf Agent"));
    assert!(content.contains("## Portfolio Agent"));
}

// Scenario 4: an unreachable worker never raises past the gateway — the
// per-agent failure text comes back as the answer instead of an HTTP error.
#[tokio::test]
async fn financial_query_against_unreachable_worker_degrades_gracefully() {
    let (llm, _) = ScriptedLlm::new(vec![r#"{"agents": ["risk-pnl-agent"], "strategy": "sequential"}"#]);
    let state = build_state(Arc::new(llm), &[("risk-pnl-agent", "http://127.0.0.1:1")]);

    let response = post_chat(state, chat_request(vec![("user", "dame el VaR del portfolio HY_MAIN")], None)).await;
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.starts_with("Agent at http://127.0.0.1:1"));
}

// Scenario 5: a single sequential-strategy worker's text passes straight
// through, with no merge header wrapped around it.
#[tokio::test]
async fn sequential_single_worker_response_is_not_wrapped_in_a_merge_section() {
    let (llm, _) = ScriptedLlm::new(vec![r#"{"agents": ["risk-pnl-agent"], "strategy": "sequential"}"#]);
    let state = build_state(Arc::new(llm), &[("risk-pnl-agent", "http://127.0.0.1:1")]);

    let response = post_chat(state, chat_request(vec![("user", "dame el VaR del portfolio HY_MAIN")], None)).await;
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(!content.contains("Multi-Source"));
}

// Scenario 6: with no registry entries and a router call that can't be
// parsed, the query still gets a usable answer via the fallback agent.
#[tokio::test]
async fn unparseable_router_response_falls_back_to_the_default_agent() {
    let (llm, _) = ScriptedLlm::new(vec!["not json at all"]);
    let state = build_state(Arc::new(llm), &[("kdb-agent", "http://127.0.0.1:1")]);

    let response = post_chat(state, chat_request(vec![("user", "top HY traders last 6 months")], None)).await;
    let content = response["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.starts_with("Agent at http://127.0.0.1:1"));
}

#[tokio::test]
async fn models_endpoint_lists_the_agentic_ai_system() {
    let (llm, _) = ScriptedLlm::new(vec!["irrelevant"]);
    let state = build_state(Arc::new(llm), &[]);
    let app = http::router(state);

    let response = app.oneshot(Request::builder().uri("/v1/models").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"][0]["id"], "agentic-ai-system");
}
