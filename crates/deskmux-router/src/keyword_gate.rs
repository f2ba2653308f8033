//! Pure-function classifier: query → {general, financial}.
//!
//! Chosen over an LLM call for sub-millisecond latency on the hot path.
//! Deterministic and side-effect free: the same input always yields the
//! same output.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    General,
    Financial,
}

const DOMAIN_TOKENS: &[&str] = &[
    // instruments / data domains
    "bond", "rfq", "cds", "etf", "nav", "aum", "var", "dv01", "cs01", "portfolio", "pnl", "p&l",
    "spread", "yield", "duration", "exposure", "holdings", "position", "basket", "premium",
    "discount", "hit rate", "credit default swap",
    // data sources
    "kdb", "amps", "state of world", "sow",
    // desk / role codes
    "desk", "trader", "hy", "ig", "em", "rates", "multi_strat",
    // temporal cues for live vs historical
    "real-time", "real time", "live", "historical", "ahora mismo", "en tiempo real", "actual",
    "current", "today", "intraday",
];

/// Lowercases the query and tests membership against a compiled set of
/// domain tokens. Returns `Financial` if any token matches, else `General`.
pub fn classify(query: &str) -> QueryClass {
    let lower = query.to_lowercase();
    if DOMAIN_TOKENS.iter().any(|token| lower.contains(token)) {
        QueryClass::Financial
    } else {
        QueryClass::General
    }
}
