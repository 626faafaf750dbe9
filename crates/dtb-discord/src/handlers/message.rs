use std::sync::Arc;

use serde_json::Value;

use dtb_core::{
    bot::Disposition,
    domain::{Author, ChannelId, IncomingMessage, MessageId, MessageRef, ServerId, UserId},
};

use crate::{router::AppState, snowflake};

/// Build the core message from a MESSAGE_CREATE payload.
///
/// Direct messages (no guild) are dropped: sessions and settings are per server.
pub fn parse_message_create(d: &Value) -> Option<IncomingMessage> {
    let server_id = snowflake(d.get("guild_id"))?;
    let channel_id = snowflake(d.get("channel_id"))?;
    let message_id = snowflake(d.get("id"))?;

    let author = d.get("author")?;
    let author_id = snowflake(author.get("id"))?;
    let name = author
        .get("username")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .to_string();
    let is_bot = d.get("webhook_id").is_some()
        || author.get("bot").and_then(Value::as_bool).unwrap_or(false);

    Some(IncomingMessage {
        message: MessageRef {
            channel_id: ChannelId(channel_id),
            message_id: MessageId(message_id),
        },
        server_id: ServerId(server_id),
        author: Author {
            id: UserId(author_id),
            name,
            is_bot,
        },
        content: d
            .get("content")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
    })
}

/// Admission runs inline so queue order matches gateway order; the command
/// reply and the translation itself finish on their own tasks.
pub async fn handle_message(state: &Arc<AppState>, d: Value) {
    let Some(msg) = parse_message_create(&d) else {
        return;
    };
    if state.is_self(msg.author.id) || msg.content.trim().is_empty() {
        return;
    }

    let id = msg.message.message_id;
    match state.bot.handle_message(msg).await {
        Disposition::Ignored | Disposition::Inactive | Disposition::Command(None) => {}
        Disposition::Command(Some(reply)) => {
            tracing::debug!("Handled command message {id}");
            let state = Arc::clone(state);
            tokio::spawn(async move { state.bot.send_reply(reply).await });
        }
        Disposition::Queued(ticket) => {
            tracing::debug!("Queued message {id} for translation");
            tokio::spawn(async move {
                if let Err(e) = ticket.wait().await {
                    tracing::error!("Translation of message {id} did not finish: {e}");
                }
            });
        }
    }
}
