use async_trait::async_trait;

use crate::{
    domain::{ChannelId, MessageRef},
    messaging::types::{MessagingCapabilities, WebhookHandle, WebhookIdentity},
    Result,
};

/// Outbound chat operations the bot core needs.
///
/// Adapters map platform failures into [`crate::Error`]; callers decide
/// whether a failure is user-visible or logged only.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageRef>;

    /// Reply to `to` without pinging its author.
    async fn reply(&self, to: MessageRef, content: &str) -> Result<MessageRef>;

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;
    async fn remove_own_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()>;
    async fn clear_reactions(&self, msg: MessageRef) -> Result<()>;

    /// Look up a channel webhook by name, creating it when absent.
    async fn find_or_create_webhook(&self, channel: ChannelId, name: &str)
        -> Result<WebhookHandle>;

    async fn execute_webhook(
        &self,
        webhook: &WebhookHandle,
        identity: &WebhookIdentity,
        content: &str,
    ) -> Result<MessageRef>;
}
