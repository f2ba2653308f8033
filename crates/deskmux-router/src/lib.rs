pub mod keyword_gate;
pub mod model_router;

pub use keyword_gate::{classify, QueryClass};
pub use model_router::{route_query, AnthropicRouterLlm, RouterDecision, RouterLlm, Strategy, FALLBACK_AGENT};
