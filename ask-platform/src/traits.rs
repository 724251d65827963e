use crate::types::{ChannelId, InteractionHandle, Message, MessageId};
use ask_transport::Result;
use async_trait::async_trait;

/// Outbound platform operations. Implementations apply retry and backoff uniformly.
#[async_trait]
pub trait PlatformApi: Send + Sync {
    /// Replace the content of the interaction's original (possibly deferred) reply.
    async fn edit_original(&self, handle: &InteractionHandle, content: &str) -> Result<Message>;

    /// Append a follow-up message to the interaction.
    async fn create_followup(&self, handle: &InteractionHandle, content: &str) -> Result<Message>;

    /// Post a new message to a channel or thread.
    async fn create_message(&self, channel_id: &ChannelId, content: &str) -> Result<Message>;

    /// Open a public thread under `channel_id` and return its id.
    async fn create_thread(&self, channel_id: &ChannelId, name: &str) -> Result<ChannelId>;

    /// One page of history, newest first, strictly older than `before` when given.
    async fn list_messages(
        &self,
        channel_id: &ChannelId,
        before: Option<&MessageId>,
        limit: u8,
    ) -> Result<Vec<Message>>;

    async fn delete_message(&self, channel_id: &ChannelId, message_id: &MessageId) -> Result<()>;
}
