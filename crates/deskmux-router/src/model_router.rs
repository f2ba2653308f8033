//! Model-based router: query + registry snapshot → which specialist
//! workers should handle it, and whether to fan them out in parallel or
//! sequentially.
//!
//! The router makes exactly one model call per financial query; its
//! correctness degrades to a safe default rather than raising. No function
//! in this module returns an `Err` that callers must handle specially —
//! `route_query` always returns a usable `RouterDecision`.

use serde::{Deserialize, Serialize};

/// Default/fallback worker when the registry is empty, the LLM response
/// can't be parsed, or the decision names no known worker.
pub const FALLBACK_AGENT: &str = "kdb-agent";

/// Curated static description table used when the registry returns no
/// entries, and to validate the LLM's agent selections against known ids.
pub const STATIC_DESCRIPTIONS: &[(&str, &str)] = &[
    (
        "kdb-agent",
        "Historical Bond RFQ analytics: trader rankings, hit rates, spreads, desk performance (HY/IG/EM/RATES), 6-month history",
    ),
    (
        "amps-agent",
        "Live real-time AMPS data (State-of-World): current orders, live positions, market quotes, intraday P&L, portfolio NAV, CDS spreads tick-by-tick, ETF NAV and flows, VaR/DV01/CS01 risk metrics. Use for 'ahora mismo', 'en tiempo real', 'actual', 'live', 'current' queries.",
    ),
    (
        "portfolio-agent",
        "Portfolio holdings and exposure: positions, weights, concentration, cost basis, duration by portfolio (HY_MAIN, IG_CORE, EM_BLEND, RATES_GOV, MULTI_STRAT)",
    ),
    (
        "cds-agent",
        "Credit Default Swap market data: CDS spreads by tenor (1/3/5/7/10y), term structures, credit curve screener",
    ),
    (
        "etf-agent",
        "ETF analytics: NAV, AUM, creation/redemption flows, basket composition, premium/discount for HY/IG/EM/RATES ETFs",
    ),
    (
        "risk-pnl-agent",
        "Cross-cutting risk and P&L: VaR, DV01, CS01 computed from live portfolio positions + market spreads; P&L attribution by desk/trader",
    ),
    (
        "financial-orchestrator",
        "Multi-source financial synthesis: combines historical + live data for complex queries needing both sources",
    ),
];

const ROUTER_SYSTEM: &str = "You are a query router for a financial data platform.\n\
Your ONLY job is to select which specialist agents should handle a query.\n\
Output valid JSON only — no explanation, no markdown, no other text.";

const ROUTER_RULES: &str = "Rules:\n\
- Select ONLY agents whose data is relevant to the query\n\
- Use \"parallel\" when agents answer independent sub-questions simultaneously\n\
- Use \"sequential\" ONLY for risk-pnl-agent (it needs portfolio + market data first)\n\
- Default to kdb-agent for general bond/trader/desk questions\n\
- For VaR, DV01, CS01, P&L attribution in real-time → include amps-agent (risk_metrics topic)\n\
- For portfolio NAV/exposure in real-time → include amps-agent (portfolio_nav topic)\n\
- For CDS spreads live/tick data → include amps-agent (cds_spreads topic)\n\
- For ETF NAV/flows live → include amps-agent (etf_nav topic)\n\
- For live/current/today/'ahora mismo'/'en tiempo real'/'actual' data → include amps-agent\n\
- For historical analytics, rankings, 6-month trends → include kdb-agent\n\n\
Respond with JSON only:\n\
{\"agents\": [\"agent-id-1\"], \"strategy\": \"parallel\", \"reasoning\": \"one sentence why\"}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    Parallel,
    Sequential,
}

#[derive(Debug, Clone)]
pub struct RouterDecision {
    pub agents: Vec<String>,
    pub strategy: Strategy,
    pub reasoning: String,
    pub fallback_used: bool,
}

impl RouterDecision {
    fn fallback() -> Self {
        Self {
            agents: vec![FALLBACK_AGENT.to_string()],
            strategy: Strategy::Parallel,
            reasoning: "fallback".to_string(),
            fallback_used: true,
        }
    }
}

/// A worker catalogue entry available to the router's prompt.
pub struct CatalogueEntry {
    pub id: String,
    pub description: String,
}

/// Build the worker catalogue: intersect registry ids with the curated
/// static table, or use the static table verbatim if the registry is
/// empty. Registry capability tags alone are too short for classification,
/// so the curated description always wins for known ids.
pub fn build_catalogue(registered_ids: &[String]) -> Vec<CatalogueEntry> {
    if registered_ids.is_empty() {
        return STATIC_DESCRIPTIONS
            .iter()
            .map(|(id, desc)| CatalogueEntry { id: id.to_string(), description: desc.to_string() })
            .collect();
    }

    registered_ids
        .iter()
        .filter_map(|id| {
            STATIC_DESCRIPTIONS
                .iter()
                .find(|(sid, _)| sid == id)
                .map(|(sid, desc)| CatalogueEntry { id: sid.to_string(), description: desc.to_string() })
        })
        .collect()
}

fn render_prompt(catalogue: &[CatalogueEntry], query: &str) -> String {
    let agent_list =
        catalogue.iter().map(|e| format!("- \"{}\": {}", e.id, e.description)).collect::<Vec<_>>().join("\n");

    format!("Available agents:\n{agent_list}\n\nUser query: \"{query}\"\n\n{ROUTER_RULES}")
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(default)]
    agents: Vec<String>,
    #[serde(default)]
    strategy: String,
    #[serde(default)]
    reasoning: String,
}

/// Strips a leading/trailing markdown code fence the model may wrap the
/// JSON in.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let without_lang = rest.trim_start_matches(|c: char| c.is_alphabetic());
        let body = without_lang.trim_start_matches('\n');
        if let Some(end) = body.rfind("```") {
            return body[..end].trim();
        }
        return body.trim();
    }
    trimmed
}

fn parse_decision(raw: &str, catalogue: &[CatalogueEntry]) -> Option<RouterDecision> {
    let cleaned = strip_code_fence(raw);
    let decision: RawDecision = serde_json::from_str(cleaned).ok()?;

    let known: Vec<&str> = catalogue.iter().map(|e| e.id.as_str()).collect();
    let mut agents: Vec<String> = decision.agents.into_iter().filter(|a| known.contains(&a.as_str())).collect();
    if agents.is_empty() {
        agents.push(FALLBACK_AGENT.to_string());
    }

    let strategy = if decision.strategy == "sequential" { Strategy::Sequential } else { Strategy::Parallel };

    Some(RouterDecision { agents, strategy, reasoning: decision.reasoning, fallback_used: false })
}

/// Anything capable of running the single structured router completion.
/// Implemented by an HTTP-backed client in `deskmux-gateway`; mocked in
/// tests so routing logic can be verified without network access.
#[async_trait::async_trait]
pub trait RouterLlm: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, String>;
}

/// Reqwest-backed Anthropic Messages API client for the router's single
/// completion call, trimmed from the streaming multi-provider machinery a
/// general-purpose model client needs down to one non-streaming JSON call.
pub struct AnthropicRouterLlm {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl AnthropicRouterLlm {
    pub fn new(api_key: String, model: String, base_url: String) -> Self {
        Self { client: reqwest::Client::new(), api_key, model, base_url }
    }
}

#[async_trait::async_trait]
impl RouterLlm for AnthropicRouterLlm {
    async fn complete(&self, system: &str, user: &str) -> Result<String, String> {
        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": 256,
            "temperature": 0,
            "system": system,
            "messages": [{"role": "user", "content": user}],
        });

        let resp = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| format!("router LLM call failed: {e}"))?;

        let value: serde_json::Value =
            resp.json().await.map_err(|e| format!("router LLM response parse failed: {e}"))?;

        value
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|part| part.get("text"))
            .and_then(|t| t.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| "router LLM response missing content[0].text".to_string())
    }
}

/// Decide which workers should handle `query`, given a snapshot of
/// currently-registered worker ids. Never fails: any error collapses into
/// a fallback decision naming [`FALLBACK_AGENT`].
pub async fn route_query(llm: &dyn RouterLlm, query: &str, registered_ids: &[String]) -> RouterDecision {
    let catalogue = build_catalogue(registered_ids);
    let prompt = render_prompt(&catalogue, query);

    match llm.complete(ROUTER_SYSTEM, &prompt).await {
        Ok(raw) => match parse_decision(&raw, &catalogue) {
            Some(decision) => {
                tracing::info!(agents = ?decision.agents, strategy = ?decision.strategy, "router decision");
                decision
            }
            None => {
                tracing::warn!(raw = %raw, "router response unparseable, falling back");
                RouterDecision::fallback()
            }
        },
        Err(e) => {
            tracing::warn!(error = %e, "router LLM call failed, falling back to {}", FALLBACK_AGENT);
            RouterDecision::fallback()
        }
    }
}
