//! Drives one `/ask` command from admission to the last delivered frame.

use crate::chunker::chunk;
use crate::config::{AgentMode, AskBotConfig};
use crate::cooldown::{CooldownDecision, CooldownGuard};
use ask_agent::{AgentApi, AgentError, AgentEvent, ChatMessage};
use ask_platform::{
    ChannelId, CommandRequest, InteractionHandle, InteractionResponse, Invocation, Message,
    PlatformApi, UserId,
};
use ask_transport::TransportError;
use futures_util::StreamExt;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub const THINKING_MESSAGE: &str = "Thinking about your question...";
pub const ERROR_MESSAGE: &str = "Sorry, I encountered an error processing your request.";
pub const TOOL_ERROR_MESSAGE: &str = "Sorry, there was an error executing the tool.";

fn too_long_message(length: usize, max: usize) -> String {
    format!(
        "Sorry, your message is too long ({length} characters). Please keep it under {max} characters."
    )
}

fn cooldown_message(remaining_seconds: u64) -> String {
    format!("Please wait {remaining_seconds} seconds before sending another message.")
}

fn thread_link_message(thread_id: &ChannelId) -> String {
    format!("I've created a thread for our conversation: <#{thread_id}>")
}

fn thread_name(username: &str) -> String {
    format!("Chat with {username}")
}

fn echo_message(question: &str) -> String {
    format!("> {question}")
}

fn tool_notice(label: &str) -> String {
    format!("Checking {label}. Please wait...")
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub max_input_chars: usize,
    pub frame_chars: usize,
    pub stream_flush_chars: usize,
    pub agent_mode: AgentMode,
    pub status_tool_prefix: Option<String>,
}

impl DriverSettings {
    pub fn from_config(cfg: &AskBotConfig) -> Self {
        Self {
            max_input_chars: cfg.limits.max_input_chars,
            frame_chars: cfg.limits.frame_chars,
            stream_flush_chars: cfg.limits.stream_flush_chars,
            agent_mode: cfg.agent.mode,
            status_tool_prefix: cfg
                .agent
                .status_tool_prefix
                .clone()
                .filter(|p| !p.is_empty()),
        }
    }
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self::from_config(&AskBotConfig::default())
    }
}

/// Where the frames of one conversation go. Fixed once opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyTarget {
    /// Follow-ups on the interaction's own reply.
    Original(InteractionHandle),
    Thread(ChannelId),
}

impl ReplyTarget {
    async fn deliver(
        &self,
        platform: &dyn PlatformApi,
        content: &str,
    ) -> Result<Message, TransportError> {
        match self {
            Self::Original(handle) => platform.create_followup(handle, content).await,
            Self::Thread(thread_id) => platform.create_message(thread_id, content).await,
        }
    }
}

/// An admitted `/ask` whose cooldown is already recorded.
#[derive(Debug, Clone)]
pub struct Conversation {
    request: CommandRequest,
    question: String,
}

impl Conversation {
    pub fn requester(&self) -> &UserId {
        &self.invocation().invoker.id
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    fn invocation(&self) -> &Invocation {
        self.request.invocation()
    }
}

#[derive(Debug)]
pub enum AskDecision {
    /// Answer the webhook directly; nothing else happens.
    Respond(InteractionResponse),
    Proceed(Conversation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationOutcome {
    Completed { frames: usize },
    Failed { error: String },
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("platform call failed: {0}")]
    Platform(#[from] TransportError),

    #[error("agent call failed: {0}")]
    Agent(#[from] AgentError),
}

#[derive(Clone)]
pub struct ConversationDriver {
    platform: Arc<dyn PlatformApi>,
    agent: Arc<dyn AgentApi>,
    cooldowns: Arc<CooldownGuard>,
    settings: DriverSettings,
}

impl ConversationDriver {
    pub fn new(
        platform: Arc<dyn PlatformApi>,
        agent: Arc<dyn AgentApi>,
        cooldowns: Arc<CooldownGuard>,
        settings: DriverSettings,
    ) -> Self {
        Self {
            platform,
            agent,
            cooldowns,
            settings,
        }
    }

    #[cfg(test)]
    pub fn cooldowns(&self) -> &CooldownGuard {
        &self.cooldowns
    }

    /// Length check, then the cooldown gate. Runs synchronously inside the webhook.
    pub fn admit(&self, request: CommandRequest, question: String, now: Instant) -> AskDecision {
        let requester = request.invocation().invoker.id.clone();
        let length = question.chars().count();
        if length > self.settings.max_input_chars {
            tracing::info!(requester = %requester, length, "question rejected: too long");
            return AskDecision::Respond(InteractionResponse::message(too_long_message(
                length,
                self.settings.max_input_chars,
            )));
        }

        if let CooldownDecision::Rejected { remaining_seconds } =
            self.cooldowns.try_admit(&requester, now)
        {
            tracing::info!(requester = %requester, remaining_seconds, "question rejected: cooldown");
            return AskDecision::Respond(InteractionResponse::message(cooldown_message(
                remaining_seconds,
            )));
        }

        tracing::debug!(requester = %requester, length, "question admitted");
        AskDecision::Proceed(Conversation { request, question })
    }

    /// Never fails: errors release the cooldown and end in one best-effort error frame.
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(requester = %conversation.requester(), dm = conversation.request.is_direct_message())
    )]
    pub async fn run(&self, conversation: Conversation) -> ConversationOutcome {
        let mut opened = None;
        match self.converse(&conversation, &mut opened).await {
            Ok(frames) => {
                tracing::info!(frames, "conversation completed");
                ConversationOutcome::Completed { frames }
            }
            Err(error) => {
                self.cooldowns.release(conversation.requester());
                tracing::warn!(%error, "conversation failed; cooldown released");

                let target = opened.unwrap_or_else(|| {
                    ReplyTarget::Original(conversation.invocation().handle.clone())
                });
                if let Err(notify_error) = target.deliver(&*self.platform, ERROR_MESSAGE).await {
                    tracing::debug!(error = %notify_error, "error notice could not be delivered");
                }
                ConversationOutcome::Failed {
                    error: error.to_string(),
                }
            }
        }
    }

    async fn converse(
        &self,
        conversation: &Conversation,
        opened: &mut Option<ReplyTarget>,
    ) -> Result<usize, ConversationError> {
        let target = self.open_target(conversation).await?;
        *opened = Some(target.clone());
        self.acknowledge(conversation, &target).await?;

        let prompt = [ChatMessage::user(conversation.question())];
        let frames = match self.settings.agent_mode {
            AgentMode::Generate => {
                let answer = self.agent.generate(&prompt).await?;
                self.deliver_text(&target, &answer).await?
            }
            AgentMode::Stream => self.relay_stream(&prompt, &target).await?,
        };
        Ok(frames)
    }

    async fn open_target(&self, conversation: &Conversation) -> Result<ReplyTarget, TransportError> {
        let invocation = conversation.invocation();
        match &conversation.request {
            CommandRequest::DirectMessage(_) => Ok(ReplyTarget::Original(invocation.handle.clone())),
            CommandRequest::Channel(_) => {
                let thread_id = self
                    .platform
                    .create_thread(&invocation.channel_id, &thread_name(&invocation.invoker.username))
                    .await?;
                tracing::info!(thread_id = %thread_id, "conversation thread opened");
                Ok(ReplyTarget::Thread(thread_id))
            }
        }
    }

    /// Replaces the deferred reply: the echoed question in DMs, a thread link otherwise.
    async fn acknowledge(
        &self,
        conversation: &Conversation,
        target: &ReplyTarget,
    ) -> Result<(), TransportError> {
        let handle = &conversation.invocation().handle;
        let echo = echo_message(conversation.question());
        match target {
            ReplyTarget::Original(_) => {
                let mut frames = chunk(&echo, self.settings.frame_chars);
                if let Some(first) = frames.next() {
                    self.platform.edit_original(handle, first).await?;
                }
                for frame in frames {
                    target.deliver(&*self.platform, frame).await?;
                }
            }
            ReplyTarget::Thread(thread_id) => {
                self.platform
                    .edit_original(handle, &thread_link_message(thread_id))
                    .await?;
                self.deliver_text(target, &echo).await?;
                target.deliver(&*self.platform, THINKING_MESSAGE).await?;
            }
        }
        Ok(())
    }

    /// Each frame is awaited before the next one is sliced.
    async fn deliver_text(&self, target: &ReplyTarget, text: &str) -> Result<usize, TransportError> {
        let mut delivered = 0;
        for frame in chunk(text, self.settings.frame_chars) {
            target.deliver(&*self.platform, frame).await?;
            delivered += 1;
        }
        tracing::debug!(frames = delivered, "text delivered");
        Ok(delivered)
    }

    async fn relay_stream(
        &self,
        prompt: &[ChatMessage],
        target: &ReplyTarget,
    ) -> Result<usize, ConversationError> {
        let mut events = self.agent.stream(prompt).await?;
        let mut buffer = String::new();
        let mut buffered_chars = 0usize;
        let mut announced: HashSet<String> = HashSet::new();
        let mut frames = 0usize;

        while let Some(event) = events.next().await {
            match event? {
                AgentEvent::TextDelta { text } => {
                    buffered_chars += text.chars().count();
                    buffer.push_str(&text);
                }
                AgentEvent::ToolCall { id, name } => {
                    tracing::debug!(tool_call_id = %id, tool = %name, "agent called tool");
                    if let Some(label) = self.status_label(&name) {
                        if announced.insert(label.clone()) {
                            target.deliver(&*self.platform, &tool_notice(&label)).await?;
                        }
                    }
                }
                AgentEvent::ToolResult { id, name } => {
                    tracing::debug!(tool_call_id = %id, tool = ?name, "tool result received");
                }
                AgentEvent::Error { message } => {
                    tracing::warn!(%message, "agent reported a tool error");
                    target.deliver(&*self.platform, TOOL_ERROR_MESSAGE).await?;
                }
                AgentEvent::Finish { reason } => {
                    tracing::debug!(reason = ?reason, "agent stream finished");
                }
            }

            if buffered_chars > self.settings.stream_flush_chars {
                frames += self.deliver_text(target, &buffer).await?;
                buffer.clear();
                buffered_chars = 0;
            }
        }

        frames += self.deliver_text(target, &buffer).await?;
        Ok(frames)
    }

    /// Display name for a tool's status notice, or `None` when it gets no notice.
    fn status_label(&self, tool_name: &str) -> Option<String> {
        match self.settings.status_tool_prefix.as_deref() {
            None => Some(tool_name.to_string()),
            Some(prefix) if tool_name.contains(prefix) => Some(tool_name.replacen(prefix, "", 1)),
            Some(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AskDecision, Conversation, ConversationDriver, ConversationOutcome, DriverSettings,
        ERROR_MESSAGE, THINKING_MESSAGE, TOOL_ERROR_MESSAGE,
    };
    use crate::config::AgentMode;
    use crate::cooldown::CooldownGuard;
    use crate::testing::{FakeAgent, FakePlatform, PlatformCall, Scripted, THREAD_ID};
    use ask_agent::AgentEvent;
    use ask_platform::{
        ApplicationId, ChannelCommand, ChannelId, CommandAction, CommandRequest,
        DirectMessageCommand, GuildId, InteractionHandle, Invocation, Invoker, UserId,
    };
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn invocation(user: &str, question: &str) -> Invocation {
        Invocation {
            handle: InteractionHandle {
                application_id: ApplicationId::new("app-1"),
                token: "token-1".to_string(),
            },
            channel_id: ChannelId::new("chan-1"),
            invoker: Invoker {
                id: UserId::new(user),
                username: "alice".to_string(),
            },
            action: CommandAction::Ask {
                question: question.to_string(),
            },
        }
    }

    fn dm_request(user: &str, question: &str) -> CommandRequest {
        CommandRequest::DirectMessage(DirectMessageCommand {
            invocation: invocation(user, question),
        })
    }

    fn channel_request(user: &str, question: &str) -> CommandRequest {
        CommandRequest::Channel(ChannelCommand {
            invocation: invocation(user, question),
            guild_id: Some(GuildId::new("guild-1")),
        })
    }

    fn driver_with(
        platform: &Arc<FakePlatform>,
        agent: &Arc<FakeAgent>,
        settings: DriverSettings,
    ) -> ConversationDriver {
        ConversationDriver::new(
            platform.clone(),
            agent.clone(),
            Arc::new(CooldownGuard::new(Duration::from_secs(10))),
            settings,
        )
    }

    fn admitted(driver: &ConversationDriver, request: CommandRequest) -> Conversation {
        let question = match &request.invocation().action {
            CommandAction::Ask { question } => question.clone(),
            other => panic!("not an ask: {other:?}"),
        };
        match driver.admit(request, question, Instant::now()) {
            AskDecision::Proceed(conversation) => conversation,
            AskDecision::Respond(response) => panic!("unexpected response: {response:?}"),
        }
    }

    fn stream_settings() -> DriverSettings {
        DriverSettings {
            agent_mode: AgentMode::Stream,
            ..DriverSettings::default()
        }
    }

    #[test]
    fn oversized_question_is_rejected_before_any_call() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::answering("unused"));
        let driver = driver_with(&platform, &agent, DriverSettings::default());
        let question = "a".repeat(2001);

        let decision = driver.admit(dm_request("u1", &question), question, Instant::now());

        let AskDecision::Respond(response) = decision else {
            panic!("oversized question was admitted");
        };
        assert_eq!(
            response.content(),
            Some(
                "Sorry, your message is too long (2001 characters). Please keep it under 2000 characters."
            )
        );
        assert!(platform.calls().is_empty());
        assert_eq!(agent.attempts(), 0);
        assert!(
            !driver
                .cooldowns()
                .is_cooling_down(&UserId::new("u1"), Instant::now())
        );
    }

    #[test]
    fn question_at_the_limit_is_admitted() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::answering("unused"));
        let driver = driver_with(&platform, &agent, DriverSettings::default());
        let question = "a".repeat(2000);

        let conversation = admitted(&driver, dm_request("u1", &question));
        assert_eq!(conversation.question().chars().count(), 2000);
    }

    #[test]
    fn second_question_inside_cooldown_gets_wait_message() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::answering("unused"));
        let driver = driver_with(&platform, &agent, DriverSettings::default());
        let t0 = Instant::now();

        let first = driver.admit(dm_request("u1", "one"), "one".to_string(), t0);
        assert!(matches!(first, AskDecision::Proceed(_)));

        let second = driver.admit(
            dm_request("u1", "two"),
            "two".to_string(),
            t0 + Duration::from_secs(3),
        );
        let AskDecision::Respond(response) = second else {
            panic!("second question was admitted");
        };
        assert_eq!(
            response.content(),
            Some("Please wait 7 seconds before sending another message.")
        );
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn channel_question_opens_thread_and_delivers_frames_in_order() {
        let answer = format!("{}{}c", "a".repeat(2000), "b".repeat(2000));
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::answering(&answer));
        let driver = driver_with(&platform, &agent, DriverSettings::default());

        let conversation = admitted(&driver, channel_request("u1", "why?"));
        let outcome = driver.run(conversation).await;

        assert_eq!(outcome, ConversationOutcome::Completed { frames: 3 });
        let calls = platform.calls();
        assert_eq!(
            calls[0],
            PlatformCall::CreateThread {
                channel: "chan-1".to_string(),
                name: "Chat with alice".to_string(),
            }
        );
        assert_eq!(
            calls[1],
            PlatformCall::EditOriginal(
                "I've created a thread for our conversation: <#thread-1>".to_string()
            )
        );
        assert!(calls[2..].iter().all(|call| matches!(
            call,
            PlatformCall::Post { channel, .. } if channel == THREAD_ID
        )));
        assert_eq!(
            platform.delivered(),
            vec![
                "> why?".to_string(),
                THINKING_MESSAGE.to_string(),
                "a".repeat(2000),
                "b".repeat(2000),
                "c".to_string(),
            ]
        );
        assert_eq!(agent.prompts(), vec!["why?".to_string()]);
    }

    #[tokio::test]
    async fn direct_message_question_edits_original_and_follows_up() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::answering("forty-two"));
        let driver = driver_with(&platform, &agent, DriverSettings::default());

        let outcome = driver.run(admitted(&driver, dm_request("u1", "meaning?"))).await;

        assert_eq!(outcome, ConversationOutcome::Completed { frames: 1 });
        assert_eq!(platform.edits(), vec!["> meaning?".to_string()]);
        assert_eq!(
            platform.calls()[1..].to_vec(),
            vec![PlatformCall::Followup("forty-two".to_string())]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn agent_timeouts_are_retried_then_answer_is_delivered_once() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::scripted(vec![
            Scripted::Hang,
            Scripted::Hang,
            Scripted::Answer("done".to_string()),
        ]));
        let driver = driver_with(&platform, &agent, DriverSettings::default());
        let started = tokio::time::Instant::now();

        let outcome = driver.run(admitted(&driver, dm_request("u1", "slow?"))).await;

        assert_eq!(outcome, ConversationOutcome::Completed { frames: 1 });
        assert_eq!(agent.attempts(), 3);
        assert!(started.elapsed() >= Duration::from_secs(8 + 1 + 8 + 2));
        let done = platform.delivered().iter().filter(|c| *c == "done").count();
        assert_eq!(done, 1);
    }

    #[tokio::test]
    async fn agent_failure_releases_cooldown_and_sends_one_error_frame() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::failing());
        let driver = driver_with(&platform, &agent, DriverSettings::default());

        let outcome = driver.run(admitted(&driver, channel_request("u1", "hm"))).await;

        assert!(matches!(outcome, ConversationOutcome::Failed { .. }));
        assert_eq!(agent.attempts(), 1);
        let delivered = platform.delivered();
        assert_eq!(delivered.last().map(String::as_str), Some(ERROR_MESSAGE));
        assert_eq!(delivered.iter().filter(|c| *c == ERROR_MESSAGE).count(), 1);
        assert!(
            !driver
                .cooldowns()
                .is_cooling_down(&UserId::new("u1"), Instant::now())
        );

        let retry = driver.admit(channel_request("u1", "hm"), "hm".to_string(), Instant::now());
        assert!(matches!(retry, AskDecision::Proceed(_)));
    }

    #[tokio::test]
    async fn thread_creation_failure_reports_on_original_reply() {
        let platform = Arc::new(FakePlatform::new().failing_thread_creation());
        let agent = Arc::new(FakeAgent::answering("unused"));
        let driver = driver_with(&platform, &agent, DriverSettings::default());

        let outcome = driver.run(admitted(&driver, channel_request("u1", "hi"))).await;

        assert!(matches!(outcome, ConversationOutcome::Failed { .. }));
        assert_eq!(agent.attempts(), 0);
        assert_eq!(
            platform.calls()[1..].to_vec(),
            vec![PlatformCall::Followup(ERROR_MESSAGE.to_string())]
        );
    }

    #[tokio::test]
    async fn failed_error_notice_is_swallowed() {
        let platform = Arc::new(FakePlatform::new().failing_deliveries_containing("Sorry"));
        let agent = Arc::new(FakeAgent::failing());
        let driver = driver_with(&platform, &agent, DriverSettings::default());

        let outcome = driver.run(admitted(&driver, channel_request("u1", "hi"))).await;

        assert!(matches!(outcome, ConversationOutcome::Failed { .. }));
        assert!(
            !driver
                .cooldowns()
                .is_cooling_down(&UserId::new("u1"), Instant::now())
        );
    }

    #[tokio::test]
    async fn stream_announces_each_tool_once_and_reports_tool_errors() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::streaming(vec![
            Ok(AgentEvent::ToolCall {
                id: "1".to_string(),
                name: "mastra_weather".to_string(),
            }),
            Ok(AgentEvent::ToolResult {
                id: "1".to_string(),
                name: Some("mastra_weather".to_string()),
            }),
            Ok(AgentEvent::TextDelta {
                text: "Sunny ".to_string(),
            }),
            Ok(AgentEvent::ToolCall {
                id: "2".to_string(),
                name: "mastra_weather".to_string(),
            }),
            Ok(AgentEvent::ToolCall {
                id: "3".to_string(),
                name: "internal_lookup".to_string(),
            }),
            Ok(AgentEvent::Error {
                message: "boom".to_string(),
            }),
            Ok(AgentEvent::TextDelta {
                text: "today".to_string(),
            }),
            Ok(AgentEvent::Finish {
                reason: Some("stop".to_string()),
            }),
        ]));
        let settings = DriverSettings {
            status_tool_prefix: Some("mastra_".to_string()),
            ..stream_settings()
        };
        let driver = driver_with(&platform, &agent, settings);

        let outcome = driver.run(admitted(&driver, dm_request("u1", "weather?"))).await;

        assert_eq!(outcome, ConversationOutcome::Completed { frames: 1 });
        assert_eq!(
            platform.delivered(),
            vec![
                "Checking weather. Please wait...".to_string(),
                TOOL_ERROR_MESSAGE.to_string(),
                "Sunny today".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn stream_flushes_buffer_once_it_exceeds_the_flush_size() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::streaming(
            ["abc", "def", "gh"]
                .into_iter()
                .map(|text| {
                    Ok(AgentEvent::TextDelta {
                        text: text.to_string(),
                    })
                })
                .collect(),
        ));
        let settings = DriverSettings {
            frame_chars: 4,
            stream_flush_chars: 5,
            ..stream_settings()
        };
        let driver = driver_with(&platform, &agent, settings);

        let outcome = driver.run(admitted(&driver, dm_request("u1", "q"))).await;

        assert_eq!(outcome, ConversationOutcome::Completed { frames: 3 });
        assert_eq!(
            platform.delivered(),
            vec!["abcd".to_string(), "ef".to_string(), "gh".to_string()]
        );
    }

    #[tokio::test]
    async fn stream_decode_error_fails_the_conversation() {
        let platform = Arc::new(FakePlatform::new());
        let agent = Arc::new(FakeAgent::streaming(vec![
            Ok(AgentEvent::TextDelta {
                text: "partial".to_string(),
            }),
            Err(ask_agent::AgentError::StreamParse("bad line".to_string())),
        ]));
        let driver = driver_with(&platform, &agent, stream_settings());

        let outcome = driver.run(admitted(&driver, dm_request("u1", "q"))).await;

        assert!(matches!(outcome, ConversationOutcome::Failed { .. }));
        assert_eq!(platform.delivered(), vec![ERROR_MESSAGE.to_string()]);
    }
}
