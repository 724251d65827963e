//! In-memory platform and agent doubles shared by the driver, sweeper and route tests.

use ask_agent::{AgentApi, AgentError, AgentEvent, AgentEventStream, ChatMessage};
use ask_platform::{
    Author, ChannelId, InteractionHandle, Message, MessageId, PlatformApi, UserId,
};
use ask_transport::{Result, RetryTransport, TransportError};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub const THREAD_ID: &str = "thread-1";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlatformCall {
    EditOriginal(String),
    Followup(String),
    Post { channel: String, content: String },
    CreateThread { channel: String, name: String },
    List { before: Option<String>, limit: u8 },
    Delete(String),
}

pub fn server_error() -> TransportError {
    TransportError::Status {
        status: 500,
        reason: "Internal Server Error".to_string(),
        body: String::new(),
    }
}

pub fn history_message(id: u64, author: &str) -> Message {
    Message {
        id: MessageId::new(format!("{id}")),
        channel_id: Some(ChannelId::new("dm-1")),
        author: Some(Author {
            id: UserId::new(author),
            bot: false,
        }),
        content: format!("message {id}"),
    }
}

#[derive(Default)]
pub struct FakePlatform {
    calls: Mutex<Vec<PlatformCall>>,
    /// Newest first, like the platform's history endpoint.
    history: Mutex<Vec<Message>>,
    next_id: AtomicU64,
    fail_thread: bool,
    fail_content: Option<String>,
    fail_deletes: HashSet<String>,
    fail_list: bool,
}

impl FakePlatform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(self, mut messages: Vec<Message>) -> Self {
        messages.sort_by_key(|m| std::cmp::Reverse(numeric_id(&m.id)));
        *self.history.lock().expect("history lock") = messages;
        self
    }

    pub fn failing_thread_creation(mut self) -> Self {
        self.fail_thread = true;
        self
    }

    /// Deliveries whose content contains `marker` fail permanently.
    pub fn failing_deliveries_containing(mut self, marker: &str) -> Self {
        self.fail_content = Some(marker.to_string());
        self
    }

    pub fn failing_delete(mut self, message_id: u64) -> Self {
        self.fail_deletes.insert(message_id.to_string());
        self
    }

    pub fn failing_listing(mut self) -> Self {
        self.fail_list = true;
        self
    }

    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().expect("calls lock").clone()
    }

    /// Content of every follow-up and channel post, in call order.
    pub fn delivered(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::Followup(content) => Some(content),
                PlatformCall::Post { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn edits(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PlatformCall::EditOriginal(content) => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn remaining_history(&self) -> Vec<Message> {
        self.history.lock().expect("history lock").clone()
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().expect("calls lock").push(call);
    }

    fn sent(&self, channel_id: Option<ChannelId>, content: &str) -> Result<Message> {
        let rejected = self
            .fail_content
            .as_deref()
            .is_some_and(|marker| content.contains(marker));
        if rejected {
            return Err(server_error());
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Message {
            id: MessageId::new(format!("sent-{id}")),
            channel_id,
            author: None,
            content: content.to_string(),
        })
    }
}

fn numeric_id(id: &MessageId) -> u64 {
    id.parse().unwrap_or(0)
}

#[async_trait]
impl PlatformApi for FakePlatform {
    async fn edit_original(&self, _handle: &InteractionHandle, content: &str) -> Result<Message> {
        self.record(PlatformCall::EditOriginal(content.to_string()));
        self.sent(None, content)
    }

    async fn create_followup(&self, _handle: &InteractionHandle, content: &str) -> Result<Message> {
        self.record(PlatformCall::Followup(content.to_string()));
        self.sent(None, content)
    }

    async fn create_message(&self, channel_id: &ChannelId, content: &str) -> Result<Message> {
        self.record(PlatformCall::Post {
            channel: channel_id.to_string(),
            content: content.to_string(),
        });
        self.sent(Some(channel_id.clone()), content)
    }

    async fn create_thread(&self, channel_id: &ChannelId, name: &str) -> Result<ChannelId> {
        self.record(PlatformCall::CreateThread {
            channel: channel_id.to_string(),
            name: name.to_string(),
        });
        if self.fail_thread {
            return Err(server_error());
        }
        Ok(ChannelId::new(THREAD_ID))
    }

    async fn list_messages(
        &self,
        _channel_id: &ChannelId,
        before: Option<&MessageId>,
        limit: u8,
    ) -> Result<Vec<Message>> {
        self.record(PlatformCall::List {
            before: before.map(|id| id.to_string()),
            limit,
        });
        if self.fail_list {
            return Err(server_error());
        }
        let cutoff = before.map(numeric_id);
        let history = self.history.lock().expect("history lock");
        Ok(history
            .iter()
            .filter(|m| cutoff.is_none_or(|c| numeric_id(&m.id) < c))
            .take(usize::from(limit))
            .cloned()
            .collect())
    }

    async fn delete_message(&self, _channel_id: &ChannelId, message_id: &MessageId) -> Result<()> {
        self.record(PlatformCall::Delete(message_id.to_string()));
        if self.fail_deletes.contains(message_id.as_str()) {
            return Err(server_error());
        }
        self.history
            .lock()
            .expect("history lock")
            .retain(|m| &m.id != message_id);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Answer(String),
    Fail(TransportError),
    /// Never answers; the retry policy's per-attempt timeout fires.
    Hang,
}

/// Agent double whose `generate` runs through a real [`RetryTransport`].
pub struct FakeAgent {
    retry: RetryTransport,
    script: Mutex<VecDeque<Scripted>>,
    events: Mutex<Vec<std::result::Result<AgentEvent, AgentError>>>,
    attempts: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl FakeAgent {
    pub fn scripted(script: Vec<Scripted>) -> Self {
        Self {
            retry: RetryTransport::default(),
            script: Mutex::new(script.into()),
            events: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn answering(text: &str) -> Self {
        Self::scripted(vec![Scripted::Answer(text.to_string())])
    }

    pub fn failing() -> Self {
        Self::scripted(vec![Scripted::Fail(server_error())])
    }

    pub fn streaming(events: Vec<std::result::Result<AgentEvent, AgentError>>) -> Self {
        let agent = Self::scripted(Vec::new());
        *agent.events.lock().expect("events lock") = events;
        agent
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts lock").clone()
    }

    fn remember(&self, messages: &[ChatMessage]) {
        let mut prompts = self.prompts.lock().expect("prompts lock");
        prompts.extend(messages.iter().map(|m| m.content.clone()));
    }
}

#[async_trait]
impl AgentApi for FakeAgent {
    async fn generate(&self, messages: &[ChatMessage]) -> ask_agent::Result<String> {
        self.remember(messages);
        let answer = self
            .retry
            .execute("agent.generate", || async move {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                let next = self.script.lock().expect("script lock").pop_front();
                match next {
                    Some(Scripted::Answer(text)) => Ok(text),
                    Some(Scripted::Fail(error)) => Err(error),
                    Some(Scripted::Hang) => {
                        tokio::time::sleep(Duration::from_secs(3600)).await;
                        Err(TransportError::Timeout)
                    }
                    None => Err(server_error()),
                }
            })
            .await?;
        Ok(answer)
    }

    async fn stream(&self, messages: &[ChatMessage]) -> ask_agent::Result<AgentEventStream> {
        self.remember(messages);
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let events = std::mem::take(&mut *self.events.lock().expect("events lock"));
        Ok(Box::pin(futures_util::stream::iter(events)))
    }
}
