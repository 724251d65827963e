//! Inbound interaction payloads, validated once into a tagged union.

use crate::commands::{ASK_COMMAND, ASK_QUESTION_OPTION, CLEAR_DM_COMMAND};
use crate::types::{ApplicationId, ChannelId, GuildId, InteractionHandle, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

const INTERACTION_TYPE_PING: u8 = 1;
const INTERACTION_TYPE_APPLICATION_COMMAND: u8 = 2;
const CHANNEL_TYPE_DM: u8 = 1;

const RESPONSE_TYPE_PONG: u8 = 1;
const RESPONSE_TYPE_CHANNEL_MESSAGE: u8 = 4;
const RESPONSE_TYPE_DEFERRED_CHANNEL_MESSAGE: u8 = 5;

#[derive(Debug, Error)]
pub enum InteractionError {
    #[error("malformed interaction payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("interaction missing {0}")]
    MissingField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Ping,
    Command(CommandRequest),
    Unsupported { kind: u8 },
}

/// A slash command, split by where it was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandRequest {
    DirectMessage(DirectMessageCommand),
    Channel(ChannelCommand),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectMessageCommand {
    pub invocation: Invocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelCommand {
    pub invocation: Invocation,
    pub guild_id: Option<GuildId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub handle: InteractionHandle,
    pub channel_id: ChannelId,
    pub invoker: Invoker,
    pub action: CommandAction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invoker {
    pub id: UserId,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandAction {
    Ask { question: String },
    ClearDm,
    Other(String),
}

impl CommandRequest {
    pub fn invocation(&self) -> &Invocation {
        match self {
            Self::DirectMessage(cmd) => &cmd.invocation,
            Self::Channel(cmd) => &cmd.invocation,
        }
    }

    pub fn is_direct_message(&self) -> bool {
        matches!(self, Self::DirectMessage(_))
    }
}

impl Interaction {
    pub fn from_slice(body: &[u8]) -> Result<Self, InteractionError> {
        let raw: RawInteraction = serde_json::from_slice(body)?;
        raw.try_into()
    }
}

#[derive(Debug, Deserialize)]
struct RawInteraction {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    application_id: Option<String>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    data: Option<RawCommandData>,
    #[serde(default)]
    channel_id: Option<String>,
    #[serde(default)]
    channel: Option<RawChannel>,
    #[serde(default)]
    guild_id: Option<String>,
    #[serde(default)]
    user: Option<RawUser>,
    #[serde(default)]
    member: Option<RawMember>,
}

#[derive(Debug, Deserialize)]
struct RawCommandData {
    name: String,
    #[serde(default)]
    options: Vec<RawOption>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    name: String,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Clone, Deserialize)]
struct RawUser {
    id: String,
    #[serde(default)]
    username: String,
}

#[derive(Debug, Deserialize)]
struct RawMember {
    #[serde(default)]
    user: Option<RawUser>,
}

impl TryFrom<RawInteraction> for Interaction {
    type Error = InteractionError;

    fn try_from(raw: RawInteraction) -> Result<Self, Self::Error> {
        match raw.kind {
            INTERACTION_TYPE_PING => Ok(Self::Ping),
            INTERACTION_TYPE_APPLICATION_COMMAND => Ok(Self::Command(raw.into_command()?)),
            kind => Ok(Self::Unsupported { kind }),
        }
    }
}

impl RawInteraction {
    fn into_command(self) -> Result<CommandRequest, InteractionError> {
        let data = self.data.ok_or(InteractionError::MissingField("data"))?;
        let application_id = self
            .application_id
            .ok_or(InteractionError::MissingField("application_id"))?;
        let token = self.token.ok_or(InteractionError::MissingField("token"))?;

        let is_dm = self
            .channel
            .as_ref()
            .is_some_and(|c| c.kind == CHANNEL_TYPE_DM);
        let channel_id = self
            .channel_id
            .or_else(|| self.channel.as_ref().map(|c| c.id.clone()))
            .ok_or(InteractionError::MissingField("channel_id"))?;

        let user = if is_dm {
            self.user
        } else {
            self.member.and_then(|m| m.user).or(self.user)
        }
        .ok_or(InteractionError::MissingField("user"))?;

        let action = match data.name.as_str() {
            ASK_COMMAND => {
                let option = data
                    .options
                    .iter()
                    .find(|o| o.name == ASK_QUESTION_OPTION)
                    .or_else(|| data.options.first());
                let question = option
                    .and_then(|o| o.value.as_ref())
                    .and_then(|v| v.as_str())
                    .ok_or(InteractionError::MissingField("question option"))?;
                CommandAction::Ask {
                    question: question.to_string(),
                }
            }
            CLEAR_DM_COMMAND => CommandAction::ClearDm,
            other => CommandAction::Other(other.to_string()),
        };

        let invocation = Invocation {
            handle: InteractionHandle {
                application_id: ApplicationId::new(application_id),
                token,
            },
            channel_id: ChannelId::new(channel_id),
            invoker: Invoker {
                id: UserId::new(user.id),
                username: user.username,
            },
            action,
        };

        if is_dm {
            Ok(CommandRequest::DirectMessage(DirectMessageCommand { invocation }))
        } else {
            Ok(CommandRequest::Channel(ChannelCommand {
                invocation,
                guild_id: self.guild_id.map(GuildId::new),
            }))
        }
    }
}

/// Synchronous reply to the webhook request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResponse {
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<InteractionResponseData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionResponseData {
    pub content: String,
}

impl InteractionResponse {
    pub fn pong() -> Self {
        Self {
            kind: RESPONSE_TYPE_PONG,
            data: None,
        }
    }

    pub fn message(content: impl Into<String>) -> Self {
        Self {
            kind: RESPONSE_TYPE_CHANNEL_MESSAGE,
            data: Some(InteractionResponseData {
                content: content.into(),
            }),
        }
    }

    /// Acknowledge now; the reply is edited later through the interaction handle.
    pub fn deferred() -> Self {
        Self {
            kind: RESPONSE_TYPE_DEFERRED_CHANNEL_MESSAGE,
            data: None,
        }
    }

    pub fn content(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.content.as_str())
    }
}
