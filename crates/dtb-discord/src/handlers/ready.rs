use std::sync::Arc;

use serde_json::Value;

use dtb_core::domain::UserId;

use crate::{router::AppState, snowflake};

#[derive(Debug, PartialEq, Eq)]
pub struct ReadyInfo {
    pub user_id: UserId,
    pub tag: String,
    pub guilds: usize,
}

pub fn parse_ready(d: &Value) -> Option<ReadyInfo> {
    let user = d.get("user")?;
    let user_id = UserId(snowflake(user.get("id"))?);
    let username = user.get("username").and_then(Value::as_str).unwrap_or("bot");
    let tag = match user.get("discriminator").and_then(Value::as_str) {
        Some(disc) if disc != "0" => format!("{username}#{disc}"),
        _ => username.to_string(),
    };
    let guilds = d
        .get("guilds")
        .and_then(Value::as_array)
        .map(Vec::len)
        .unwrap_or(0);
    Some(ReadyInfo {
        user_id,
        tag,
        guilds,
    })
}

pub fn handle_ready(state: Arc<AppState>, d: Value) {
    let Some(info) = parse_ready(&d) else {
        tracing::warn!("READY without a user object");
        return;
    };
    tracing::info!("Logged in as {}!", info.tag);
    tracing::info!("Bot is ready in {} servers!", info.guilds);
    state.set_self(info.user_id);
}
