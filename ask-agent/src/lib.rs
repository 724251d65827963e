//! Client for the remote language-model agent.
//!
//! Supports a single-shot `generate` call and a `stream` call that yields
//! typed [`AgentEvent`]s. Both go through the bounded retry transport.

mod client;
mod error;
mod stream;
mod types;

pub use client::{AgentApi, AgentClient, AgentEventStream};
pub use error::{AgentError, Result};
pub use types::{AgentEvent, ChatMessage, Role};
