use crate::commands::CommandDefinition;
use crate::traits::PlatformApi;
use crate::types::{ApplicationId, ChannelId, InteractionHandle, Message, MessageId};
use ask_transport::{HttpTransport, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";
const PUBLIC_THREAD_CHANNEL_TYPE: u8 = 11;
const THREAD_NAME_MAX_CHARS: usize = 100;

#[derive(Clone)]
pub struct DiscordClient {
    transport: HttpTransport,
    bot_token: String,
    api_base_url: String,
    thread_auto_archive_minutes: u32,
}

impl DiscordClient {
    pub fn new(transport: HttpTransport, bot_token: &str) -> Self {
        Self {
            transport,
            bot_token: bot_token.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            thread_auto_archive_minutes: 60,
        }
    }

    pub fn with_api_base_url(mut self, api_base_url: &str) -> Self {
        self.api_base_url = api_base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_thread_auto_archive_minutes(mut self, minutes: u32) -> Self {
        self.thread_auto_archive_minutes = minutes;
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base_url)
    }

    fn bot_auth(&self) -> String {
        format!("Bot {}", self.bot_token)
    }

    /// Replaces the application's global slash commands.
    #[tracing::instrument(level = "info", skip_all, fields(application_id = %application_id))]
    pub async fn register_commands(
        &self,
        application_id: &ApplicationId,
        commands: &[CommandDefinition],
    ) -> Result<usize> {
        let url = self.api_url(&format!("/applications/{application_id}/commands"));
        let auth = self.bot_auth();
        let registered: Vec<serde_json::Value> = self
            .transport
            .send_json("discord.register_commands", |http| {
                http.put(&url)
                    .header("Authorization", &auth)
                    .json(commands)
            })
            .await?;
        Ok(registered.len())
    }
}

#[derive(Debug, Serialize)]
struct ContentBody<'a> {
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct CreateThreadBody<'a> {
    name: &'a str,
    auto_archive_duration: u32,
    #[serde(rename = "type")]
    kind: u8,
}

#[derive(Debug, Deserialize)]
struct CreatedChannel {
    id: ChannelId,
}

#[async_trait]
impl PlatformApi for DiscordClient {
    async fn edit_original(&self, handle: &InteractionHandle, content: &str) -> Result<Message> {
        let url = self.api_url(&format!(
            "/webhooks/{}/{}/messages/@original",
            handle.application_id, handle.token
        ));
        let body = ContentBody { content };
        self.transport
            .send_json("discord.edit_original", |http| http.patch(&url).json(&body))
            .await
    }

    async fn create_followup(&self, handle: &InteractionHandle, content: &str) -> Result<Message> {
        let url = self.api_url(&format!(
            "/webhooks/{}/{}",
            handle.application_id, handle.token
        ));
        let body = ContentBody { content };
        self.transport
            .send_json("discord.create_followup", |http| {
                http.post(&url).query(&[("wait", "true")]).json(&body)
            })
            .await
    }

    async fn create_message(&self, channel_id: &ChannelId, content: &str) -> Result<Message> {
        let url = self.api_url(&format!("/channels/{channel_id}/messages"));
        let auth = self.bot_auth();
        let body = ContentBody { content };
        self.transport
            .send_json("discord.create_message", |http| {
                http.post(&url).header("Authorization", &auth).json(&body)
            })
            .await
    }

    async fn create_thread(&self, channel_id: &ChannelId, name: &str) -> Result<ChannelId> {
        let url = self.api_url(&format!("/channels/{channel_id}/threads"));
        let auth = self.bot_auth();
        let name: String = name.chars().take(THREAD_NAME_MAX_CHARS).collect();
        let body = CreateThreadBody {
            name: &name,
            auto_archive_duration: self.thread_auto_archive_minutes,
            kind: PUBLIC_THREAD_CHANNEL_TYPE,
        };
        let created: CreatedChannel = self
            .transport
            .send_json("discord.create_thread", |http| {
                http.post(&url).header("Authorization", &auth).json(&body)
            })
            .await?;
        Ok(created.id)
    }

    async fn list_messages(
        &self,
        channel_id: &ChannelId,
        before: Option<&MessageId>,
        limit: u8,
    ) -> Result<Vec<Message>> {
        let url = self.api_url(&format!("/channels/{channel_id}/messages"));
        let auth = self.bot_auth();
        let mut query = vec![("limit", limit.to_string())];
        if let Some(before) = before {
            query.push(("before", before.to_string()));
        }
        self.transport
            .send_json("discord.list_messages", |http| {
                http.get(&url).header("Authorization", &auth).query(&query)
            })
            .await
    }

    async fn delete_message(&self, channel_id: &ChannelId, message_id: &MessageId) -> Result<()> {
        let url = self.api_url(&format!("/channels/{channel_id}/messages/{message_id}"));
        let auth = self.bot_auth();
        self.transport
            .send_empty("discord.delete_message", |http| {
                http.delete(&url).header("Authorization", &auth)
            })
            .await
    }
}
