use crate::domain::ChannelId;

/// A channel webhook the bot may post through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookHandle {
    pub id: String,
    pub token: String,
    pub channel_id: ChannelId,
}

/// Display identity for a single webhook post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookIdentity {
    pub username: String,
    pub avatar_url: Option<String>,
}

impl WebhookIdentity {
    pub fn new(username: impl Into<String>, avatar_url: Option<String>) -> Self {
        Self {
            username: username.into(),
            avatar_url,
        }
    }
}

/// Feature flags / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_webhooks: bool,
    /// Hard cap on one message's length, in characters.
    pub max_message_len: usize,
}
