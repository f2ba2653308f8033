//! Intake → retrieve → dispatch → format pipeline graph.
//!
//! Each node is a plain function over `&mut PipelineState`. Once `error` is
//! set, downstream nodes other than `format` become no-ops; `format` always
//! runs and renders either the synthesis or the error.

pub mod merger;

use std::time::Duration;

use deskmux_a2a::client::Resolver;
use deskmux_retriever::{RetrievedChunk, Retriever};
use deskmux_router::{keyword_gate, model_router, RouterLlm};

const RESEARCHER_SYSTEM: &str =
    "You are a research assistant. Investigate the question using any provided context and produce clear findings.";
const SYNTHESIZER_SYSTEM: &str =
    "You are a synthesis assistant. Produce a clear, structured final answer from the research findings provided.";

#[derive(Debug, Clone)]
pub struct PipelineState {
    pub raw_query: String,
    pub validated_query: String,
    pub rag_context: Vec<RetrievedChunk>,
    pub research: Option<String>,
    pub synthesis: Option<String>,
    pub final_response: Option<String>,
    pub error: Option<String>,
    pub session_id: Option<String>,
}

impl PipelineState {
    fn new(raw_query: String, session_id: Option<String>) -> Self {
        Self {
            raw_query,
            validated_query: String::new(),
            rag_context: Vec::new(),
            research: None,
            synthesis: None,
            final_response: None,
            error: None,
            session_id,
        }
    }
}

/// Everything the graph needs to run one request. Borrowed for the
/// duration of a single `run` call — the gateway owns the long-lived
/// retriever/registry/http-client instances.
pub struct PipelineDeps<'a> {
    pub retriever: &'a Retriever,
    pub llm: &'a dyn RouterLlm,
    pub http_client: &'a reqwest::Client,
    pub resolve: &'a Resolver<'a>,
    pub a2a_timeout: Duration,
    pub registered_ids: Vec<String>,
    pub rag_top_k: usize,
}

/// Run the full graph for one request. The graph itself is stateless and
/// reusable across invocations — only `PipelineState` is per-call.
pub async fn run(raw_query: String, session_id: Option<String>, deps: &PipelineDeps<'_>) -> PipelineState {
    let mut state = PipelineState::new(raw_query, session_id);

    intake(&mut state);
    if state.error.is_none() {
        retrieve(&mut state, deps).await;
    }
    if state.error.is_none() {
        dispatch(&mut state, deps).await;
    }
    format_response(&mut state);

    state
}

fn intake(state: &mut PipelineState) {
    let trimmed = state.raw_query.trim().to_string();
    if trimmed.is_empty() {
        state.error = Some("Empty query received.".to_string());
        return;
    }
    state.validated_query = trimmed;
}

async fn retrieve(state: &mut PipelineState, deps: &PipelineDeps<'_>) {
    state.rag_context = deps.retriever.retrieve(&state.validated_query, deps.rag_top_k);
}

fn rag_context_block(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }
    let snippets =
        chunks.iter().enumerate().map(|(i, c)| format!("[{}] {}", i + 1, c.text)).collect::<Vec<_>>().join("\n\n");
    format!("\n\nPre-retrieved context from RAG (use as starting point):\n{snippets}")
}

async fn dispatch(state: &mut PipelineState, deps: &PipelineDeps<'_>) {
    let context_block = rag_context_block(&state.rag_context);

    match keyword_gate::classify(&state.validated_query) {
        keyword_gate::QueryClass::General => general_branch(state, deps, &context_block).await,
        keyword_gate::QueryClass::Financial => financial_branch(state, deps, &context_block).await,
    }
}

async fn general_branch(state: &mut PipelineState, deps: &PipelineDeps<'_>, context_block: &str) {
    let research_prompt = format!("Research the following question thoroughly: {}{}", state.validated_query, context_block);
    let research = match deps.llm.complete(RESEARCHER_SYSTEM, &research_prompt).await {
        Ok(text) => text,
        Err(e) => {
            state.error = Some(format!("research pass failed: {e}"));
            return;
        }
    };

    let synthesis_prompt = format!(
        "Original question: {}\n\nResearch findings:\n{research}\n\nPlease synthesize a clear, structured answer.",
        state.validated_query
    );
    let synthesis = match deps.llm.complete(SYNTHESIZER_SYSTEM, &synthesis_prompt).await {
        Ok(text) => text,
        Err(e) => {
            state.error = Some(format!("synthesis pass failed: {e}"));
            return;
        }
    };

    state.research = Some(research);
    state.synthesis = Some(synthesis);
}

async fn financial_branch(state: &mut PipelineState, deps: &PipelineDeps<'_>, context_block: &str) {
    let decision = model_router::route_query(deps.llm, &state.validated_query, &deps.registered_ids).await;
    let worker_query = format!("{}{}", state.validated_query, context_block);

    let results = match decision.strategy {
        model_router::Strategy::Parallel => {
            deskmux_a2a::call_all(
                deps.http_client,
                &decision.agents,
                &worker_query,
                deps.a2a_timeout,
                state.session_id.as_deref(),
                deps.resolve,
            )
            .await
        }
        model_router::Strategy::Sequential => {
            let mut results = std::collections::HashMap::new();
            for id in &decision.agents {
                let endpoint = (deps.resolve)(id);
                let text = deskmux_a2a::call(deps.http_client, &endpoint, &worker_query, deps.a2a_timeout, state.session_id.as_deref()).await;
                results.insert(id.clone(), text);
            }
            results
        }
    };

    state.research = Some(format!("dispatched to {:?} via {:?}", decision.agents, decision.strategy));

    if decision.agents.len() == 1 {
        let only = &decision.agents[0];
        state.synthesis = results.get(only).cloned();
    } else {
        state.synthesis = Some(merger::merge(&state.validated_query, &decision.agents, &results));
    }
}

fn format_response(state: &mut PipelineState) {
    if let Some(error) = &state.error {
        state.final_response = Some(format!("Error: {error}"));
        return;
    }

    let synthesis = state.synthesis.clone().unwrap_or_default();

    let mut sources: Vec<&str> = state.rag_context.iter().map(|c| c.source.as_str()).filter(|s| !s.is_empty()).collect();
    sources.sort_unstable();
    sources.dedup();

    let sources_block =
        if sources.is_empty() { String::new() } else { format!("\n\n---\n**Sources:** {}", sources.join(" | ")) };

    state.final_response = Some(format!("{synthesis}{sources_block}"));
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskmux_retriever::Retriever;
    use deskmux_router::RouterLlm;

    struct StubLlm {
        response: String,
    }

    #[async_trait::async_trait]
    impl RouterLlm for StubLlm {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, String> {
            Ok(self.response.clone())
        }
    }

    struct FailingLlm;

    #[async_trait::async_trait]
    impl RouterLlm for FailingLlm {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, String> {
            Err("llm unavailable".to_string())
        }
    }

    fn resolver() -> Box<dyn Fn(&str) -> String + Send + Sync> {
        Box::new(|_id: &str| "http://127.0.0.1:1".to_string())
    }

    #[tokio::test]
    async fn empty_query_short_circuits_to_error_response() {
        let retriever = Retriever::with_hash_embedder();
        let llm = FailingLlm;
        let resolve = resolver();
        let deps = PipelineDeps {
            retriever: &retriever,
            llm: &llm,
            http_client: &reqwest::Client::new(),
            resolve: &*resolve,
            a2a_timeout: Duration::from_secs(1),
            registered_ids: vec![],
            rag_top_k: 4,
        };

        let state = run("   ".to_string(), None, &deps).await;
        assert_eq!(state.final_response.as_deref(), Some("Error: Empty query received."));
    }

    #[tokio::test]
    async fn general_query_runs_research_then_synthesis() {
        let retriever = Retriever::with_hash_embedder();
        let llm = StubLlm { response: "a clear answer".to_string() };
        let resolve = resolver();
        let deps = PipelineDeps {
            retriever: &retriever,
            llm: &llm,
            http_client: &reqwest::Client::new(),
            resolve: &*resolve,
            a2a_timeout: Duration::from_secs(1),
            registered_ids: vec![],
            rag_top_k: 4,
        };

        let state = run("What is a state machine?".to_string(), None, &deps).await;
        assert_eq!(state.final_response.as_deref(), Some("a clear answer"));
        assert!(state.error.is_none());
    }

    #[tokio::test]
    async fn financial_query_with_single_worker_uses_text_directly() {
        let retriever = Retriever::with_hash_embedder();
        let llm = StubLlm { response: r#"{"agents": ["risk-pnl-agent"], "strategy": "sequential"}"#.to_string() };
        let resolve = resolver();
        let deps = PipelineDeps {
            retriever: &retriever,
            llm: &llm,
            http_client: &reqwest::Client::new(),
            resolve: &*resolve,
            a2a_timeout: Duration::from_millis(50),
            registered_ids: vec![],
            rag_top_k: 4,
        };

        let state = run("dame el VaR del portfolio HY_MAIN".to_string(), None, &deps).await;
        // unreachable stub endpoint -> single-worker text is the error string verbatim, no merge block.
        assert!(state.final_response.as_deref().unwrap().starts_with("Agent at http://127.0.0.1:1"));
        assert!(!state.final_response.as_deref().unwrap().contains("Multi-Source"));
    }

    #[tokio::test]
    async fn financial_query_with_multiple_workers_merges_sections() {
        let retriever = Retriever::with_hash_embedder();
        let llm = StubLlm {
            response: r#"{"agents": ["etf-agent", "portfolio-agent"], "strategy": "parallel"}"#.to_string(),
        };
        let resolve = resolver();
        let deps = PipelineDeps {
            retriever: &retriever,
            llm: &llm,
            http_client: &reqwest::Client::new(),
            resolve: &*resolve,
            a2a_timeout: Duration::from_millis(50),
            registered_ids: vec![],
            rag_top_k: 4,
        };

        let state = run("exposure en HY bonds y flujos de ETFs".to_string(), None, &deps).await;
        let response = state.final_response.unwrap();
        assert!(response.contains("## Etf Agent"));
        assert!(response.contains("## Portfolio Agent"));
    }

    #[tokio::test]
    async fn sources_footer_lists_unique_sorted_sources() {
        let retriever = Retriever::with_hash_embedder();
        retriever.add_texts(&["doc one".to_string(), "doc two".to_string()], &["b.md".to_string(), "a.md".to_string()]);
        let llm = StubLlm { response: "answer".to_string() };
        let resolve = resolver();
        let deps = PipelineDeps {
            retriever: &retriever,
            llm: &llm,
            http_client: &reqwest::Client::new(),
            resolve: &*resolve,
            a2a_timeout: Duration::from_secs(1),
            registered_ids: vec![],
            rag_top_k: 4,
        };

        let state = run("What is a scheduler?".to_string(), None, &deps).await;
        let response = state.final_response.unwrap();
        assert!(response.contains("**Sources:** a.md | b.md"));
    }

    #[tokio::test]
    async fn error_response_omits_sources_footer() {
        let retriever = Retriever::with_hash_embedder();
        retriever.add_texts(&["doc".to_string()], &["a.md".to_string()]);
        let llm = FailingLlm;
        let resolve = resolver();
        let deps = PipelineDeps {
            retriever: &retriever,
            llm: &llm,
            http_client: &reqwest::Client::new(),
            resolve: &*resolve,
            a2a_timeout: Duration::from_secs(1),
            registered_ids: vec![],
            rag_top_k: 4,
        };

        let state = run("What is a scheduler?".to_string(), None, &deps).await;
        let response = state.final_response.unwrap();
        assert!(response.starts_with("Error: "));
        assert!(!response.contains("Sources"));
    }

    #[test]
    fn rag_context_block_is_empty_for_no_chunks() {
        assert_eq!(rag_context_block(&[]), "");
    }
}
