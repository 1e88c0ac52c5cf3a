//! Agent runner: drives one request through the chat API.

mod runner;

pub use runner::{resolve_api_key, AgentRunner, RunnerConfig};
