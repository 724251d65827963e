//! `/cleardm`: walks a channel's history backwards and deletes the bot's own messages.

use ask_platform::{ChannelId, Invocation, MessageId, PlatformApi, UserId};
use ask_transport::TransportError;
use std::sync::Arc;
use std::time::Duration;

pub const DM_ONLY_MESSAGE: &str = "This command can only be used in DMs.";
pub const SWEEP_STARTED_MESSAGE: &str = "Deleting my messages...";
pub const SWEEP_FAILED_MESSAGE: &str = "Error clearing messages.";

fn sweep_summary(deleted: usize) -> String {
    format!("Deleted {deleted} message(s).")
}

/// Discord's maximum history page.
pub const SWEEP_PAGE_SIZE: u8 = 100;
/// Pause after every deletion attempt, successful or not.
pub const DELETE_DELAY: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    pub failed: usize,
    pub pages: usize,
}

#[derive(Clone)]
pub struct Sweeper {
    platform: Arc<dyn PlatformApi>,
}

impl Sweeper {
    pub fn new(platform: Arc<dyn PlatformApi>) -> Self {
        Self { platform }
    }

    /// Deletes every message in `channel_id` authored by `actor_id`.
    ///
    /// A failed page fetch aborts the sweep; a failed delete is logged and skipped.
    /// Ends when a page comes back empty.
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(channel_id = %channel_id, actor_id = %actor_id)
    )]
    pub async fn sweep(
        &self,
        channel_id: &ChannelId,
        actor_id: &UserId,
    ) -> Result<SweepReport, TransportError> {
        let mut report = SweepReport::default();
        let mut cursor: Option<MessageId> = None;

        loop {
            let page = self
                .platform
                .list_messages(channel_id, cursor.as_ref(), SWEEP_PAGE_SIZE)
                .await?;
            let Some(oldest) = page.last() else {
                break;
            };
            report.pages += 1;
            let next_cursor = oldest.id.clone();
            tracing::debug!(page = report.pages, messages = page.len(), "history page fetched");

            for message in page.iter().filter(|m| m.is_authored_by(actor_id)) {
                match self.platform.delete_message(channel_id, &message.id).await {
                    Ok(()) => report.deleted += 1,
                    Err(error) => {
                        report.failed += 1;
                        tracing::warn!(message_id = %message.id, %error, "delete failed; continuing sweep");
                    }
                }
                tokio::time::sleep(DELETE_DELAY).await;
            }

            cursor = Some(next_cursor);
        }

        tracing::info!(
            deleted = report.deleted,
            failed = report.failed,
            pages = report.pages,
            "sweep finished"
        );
        Ok(report)
    }

    /// Runs a sweep for a `/cleardm` invocation and edits the original reply with the result.
    /// The actor is the application itself.
    pub async fn clear_and_report(&self, invocation: &Invocation) -> Option<SweepReport> {
        let actor_id = UserId::new(invocation.handle.application_id.as_str());
        match self.sweep(&invocation.channel_id, &actor_id).await {
            Ok(report) => {
                let summary = sweep_summary(report.deleted);
                if let Err(error) = self.platform.edit_original(&invocation.handle, &summary).await {
                    tracing::debug!(%error, "sweep summary could not be posted");
                }
                Some(report)
            }
            Err(error) => {
                tracing::error!(%error, "sweep aborted");
                if let Err(notify_error) = self
                    .platform
                    .edit_original(&invocation.handle, SWEEP_FAILED_MESSAGE)
                    .await
                {
                    tracing::debug!(error = %notify_error, "sweep failure notice could not be posted");
                }
                None
            }
        }
    }
}
