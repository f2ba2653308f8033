//! OpenAI-compatible chat gateway: session binding, pipeline invocation,
//! response shaping.

pub mod error;
pub mod gateway;
pub mod http;
pub mod persistence;
pub mod state;

pub use error::GatewayError;
pub use gateway::run;
pub use state::AppState;
