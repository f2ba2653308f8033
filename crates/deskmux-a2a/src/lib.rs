pub mod client;
pub mod server;
pub mod types;

pub use client::{call, call_all, Resolver};
pub use types::{AgentCard, Task, TaskResult};
