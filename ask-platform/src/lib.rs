//! Messaging platform plumbing.
//!
//! The rest of the bot depends only on [`PlatformApi`] for outbound calls,
//! on [`Interaction`] for inbound payloads and on [`SignatureVerifier`] for
//! request authentication.

mod commands;
mod discord;
mod interaction;
mod signature;
mod traits;
mod types;

pub use commands::{
    ASK_COMMAND, ASK_QUESTION_OPTION, CLEAR_DM_COMMAND, CommandDefinition, CommandOption,
    default_commands,
};
pub use discord::{DEFAULT_API_BASE_URL, DiscordClient};
pub use interaction::{
    ChannelCommand, CommandAction, CommandRequest, DirectMessageCommand, Interaction,
    InteractionError, InteractionResponse, Invocation, Invoker,
};
pub use signature::{Ed25519Verifier, SignatureError, SignatureVerifier};
pub use traits::PlatformApi;
pub use types::{
    ApplicationId, Author, ChannelId, GuildId, InteractionHandle, Message, MessageId, UserId,
};
