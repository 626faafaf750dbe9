//! Discord adapter.
//!
//! This crate implements the `dtb-core` MessagingPort over the Discord REST API
//! and feeds gateway events into the bot runtime.

use async_trait::async_trait;
use serde_json::{json, Value};

pub mod gateway;
pub mod handlers;
pub mod http;
pub mod router;

use dtb_core::{
    domain::{ChannelId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, WebhookHandle, WebhookIdentity},
    },
    Result,
};

use crate::http::DiscordHttp;

#[derive(Clone)]
pub struct DiscordMessenger {
    http: DiscordHttp,
}

impl DiscordMessenger {
    pub fn new(http: DiscordHttp) -> Self {
        Self { http }
    }

    pub fn http(&self) -> &DiscordHttp {
        &self.http
    }

    fn map_err(e: anyhow::Error) -> Error {
        Error::Delivery(format!("discord error: {e:#}"))
    }

    fn message_ref(channel_id: ChannelId, v: &Value) -> Result<MessageRef> {
        let id = snowflake(v.get("id"))
            .ok_or_else(|| Error::External("discord message without id".to_string()))?;
        Ok(MessageRef {
            channel_id,
            message_id: MessageId(id),
        })
    }
}

/// Discord sends snowflakes as strings.
pub fn snowflake(v: Option<&Value>) -> Option<u64> {
    match v? {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64(),
        _ => None,
    }
}

/// Pick the bot-owned webhook named `name` out of a channel's webhook list.
/// Webhooks created by other applications come back without a token.
fn find_named_webhook(hooks: &[Value], name: &str) -> Option<(String, String)> {
    hooks.iter().find_map(|h| {
        if h.get("name").and_then(Value::as_str) != Some(name) {
            return None;
        }
        let id = h.get("id")?.as_str()?.to_string();
        let token = h.get("token")?.as_str()?.to_string();
        Some((id, token))
    })
}

fn webhook_body(identity: &WebhookIdentity, content: &str) -> Value {
    let mut body = json!({
        "content": content,
        "username": identity.username,
        "allowed_mentions": { "parse": [] },
    });
    if let Some(url) = &identity.avatar_url {
        body["avatar_url"] = json!(url);
    }
    body
}

#[async_trait]
impl MessagingPort for DiscordMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_webhooks: true,
            max_message_len: 2000,
        }
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageRef> {
        let v = self
            .http
            .create_message(channel.0, json!({ "content": content }))
            .await
            .map_err(Self::map_err)?;
        Self::message_ref(channel, &v)
    }

    async fn reply(&self, to: MessageRef, content: &str) -> Result<MessageRef> {
        let body = json!({
            "content": content,
            "message_reference": {
                "message_id": to.message_id.to_string(),
                "fail_if_not_exists": false,
            },
            "allowed_mentions": { "replied_user": false },
        });
        let v = self
            .http
            .create_message(to.channel_id.0, body)
            .await
            .map_err(Self::map_err)?;
        Self::message_ref(to.channel_id, &v)
    }

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.http
            .put_reaction(msg.channel_id.0, msg.message_id.0, emoji)
            .await
            .map_err(Self::map_err)
    }

    async fn remove_own_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.http
            .delete_own_reaction(msg.channel_id.0, msg.message_id.0, emoji)
            .await
            .map_err(Self::map_err)
    }

    async fn clear_reactions(&self, msg: MessageRef) -> Result<()> {
        self.http
            .delete_all_reactions(msg.channel_id.0, msg.message_id.0)
            .await
            .map_err(Self::map_err)
    }

    async fn find_or_create_webhook(
        &self,
        channel: ChannelId,
        name: &str,
    ) -> Result<WebhookHandle> {
        let hooks = self
            .http
            .channel_webhooks(channel.0)
            .await
            .map_err(Self::map_err)?;

        let (id, token) = match find_named_webhook(&hooks, name) {
            Some(found) => found,
            None => {
                let created = self
                    .http
                    .create_webhook(channel.0, name)
                    .await
                    .map_err(Self::map_err)?;
                tracing::info!("Created webhook {name} in channel {channel}");
                find_named_webhook(std::slice::from_ref(&created), name).ok_or_else(|| {
                    Error::Delivery("created webhook has no token".to_string())
                })?
            }
        };

        Ok(WebhookHandle {
            id,
            token,
            channel_id: channel,
        })
    }

    async fn execute_webhook(
        &self,
        webhook: &WebhookHandle,
        identity: &WebhookIdentity,
        content: &str,
    ) -> Result<MessageRef> {
        let v = self
            .http
            .execute_webhook(&webhook.id, &webhook.token, webhook_body(identity, content))
            .await
            .map_err(Self::map_err)?;
        Self::message_ref(webhook.channel_id, &v)
    }
}
