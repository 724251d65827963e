use crate::error::{AgentError, Result};
use crate::stream::decode_data_stream;
use crate::types::{AgentEvent, ChatMessage};
use ask_transport::HttpTransport;
use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

pub type AgentEventStream = Pin<Box<dyn Stream<Item = Result<AgentEvent>> + Send>>;

#[async_trait]
pub trait AgentApi: Send + Sync {
    /// Returns the agent's complete answer.
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Returns a finite, non-restartable sequence of events.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<AgentEventStream>;
}

#[derive(Clone)]
pub struct AgentClient {
    transport: HttpTransport,
    base_url: String,
    agent_id: String,
}

impl AgentClient {
    pub fn new(transport: HttpTransport, base_url: &str, agent_id: &str) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            agent_id: agent_id.to_string(),
        }
    }

    fn endpoint(&self, action: &str) -> String {
        format!("{}/api/agents/{}/{action}", self.base_url, self.agent_id)
    }
}

#[derive(Debug, Serialize)]
struct AgentRequest<'a> {
    messages: &'a [ChatMessage],
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    text: Option<String>,
}

#[async_trait]
impl AgentApi for AgentClient {
    #[tracing::instrument(level = "info", skip_all, fields(agent_id = %self.agent_id))]
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        let url = self.endpoint("generate");
        let body = AgentRequest { messages };
        let response: GenerateResponse = self
            .transport
            .send_json("agent.generate", |http| http.post(&url).json(&body))
            .await?;
        response
            .text
            .ok_or_else(|| AgentError::ResponseFormat("agent response missing text".to_string()))
    }

    #[tracing::instrument(level = "info", skip_all, fields(agent_id = %self.agent_id))]
    async fn stream(&self, messages: &[ChatMessage]) -> Result<AgentEventStream> {
        let url = self.endpoint("stream");
        let body = AgentRequest { messages };
        let response = self
            .transport
            .send_streaming("agent.stream", |http| http.post(&url).json(&body))
            .await?;
        Ok(Box::pin(decode_data_stream(response.bytes_stream())))
    }
}
