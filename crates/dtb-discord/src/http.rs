//! Thin Discord REST v10 client with 429 retry.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{header::HeaderMap, Method, Response};
use serde_json::{json, Value};
use tokio::time::sleep;

pub const API_BASE: &str = "https://discord.com/api/v10";

const MAX_RATE_LIMIT_RETRIES: u8 = 3;

/// Emoji path segment for the reactions endpoints.
pub fn encode_emoji(emoji: &str) -> String {
    let mut out = String::with_capacity(emoji.len() * 3);
    for b in emoji.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~' | b':') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
    let seconds = headers
        .get("Retry-After")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<f64>().ok())?;
    if seconds <= 0.0 {
        return Some(Duration::ZERO);
    }
    Some(Duration::from_secs_f64(seconds))
}

#[derive(Clone)]
pub struct DiscordHttp {
    client: reqwest::Client,
    bot_token: String,
    base_url: String,
}

impl DiscordHttp {
    pub fn new(bot_token: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client build");
        Self {
            client,
            bot_token: bot_token.into(),
            base_url: API_BASE.to_string(),
        }
    }

    pub fn token(&self) -> &str {
        &self.bot_token
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    pub async fn create_message(&self, channel_id: u64, body: Value) -> Result<Value> {
        let resp = self
            .request(
                Method::POST,
                &format!("/channels/{channel_id}/messages"),
                Some(body),
                true,
            )
            .await
            .context("send Discord message")?;
        resp.json().await.context("parse Discord message JSON")
    }

    pub async fn put_reaction(&self, channel_id: u64, message_id: u64, emoji: &str) -> Result<()> {
        let path = format!(
            "/channels/{channel_id}/messages/{message_id}/reactions/{}/@me",
            encode_emoji(emoji)
        );
        self.request(Method::PUT, &path, None, true)
            .await
            .context("add Discord reaction")?;
        Ok(())
    }

    pub async fn delete_own_reaction(
        &self,
        channel_id: u64,
        message_id: u64,
        emoji: &str,
    ) -> Result<()> {
        let path = format!(
            "/channels/{channel_id}/messages/{message_id}/reactions/{}/@me",
            encode_emoji(emoji)
        );
        self.request(Method::DELETE, &path, None, true)
            .await
            .context("remove Discord reaction")?;
        Ok(())
    }

    pub async fn delete_all_reactions(&self, channel_id: u64, message_id: u64) -> Result<()> {
        let path = format!("/channels/{channel_id}/messages/{message_id}/reactions");
        self.request(Method::DELETE, &path, None, true)
            .await
            .context("clear Discord reactions")?;
        Ok(())
    }

    pub async fn channel_webhooks(&self, channel_id: u64) -> Result<Vec<Value>> {
        let resp = self
            .request(
                Method::GET,
                &format!("/channels/{channel_id}/webhooks"),
                None,
                true,
            )
            .await
            .context("list Discord webhooks")?;
        resp.json().await.context("parse Discord webhook list JSON")
    }

    pub async fn create_webhook(&self, channel_id: u64, name: &str) -> Result<Value> {
        let resp = self
            .request(
                Method::POST,
                &format!("/channels/{channel_id}/webhooks"),
                Some(json!({ "name": name })),
                true,
            )
            .await
            .context("create Discord webhook")?;
        resp.json().await.context("parse Discord webhook JSON")
    }

    /// Webhook execution is authenticated by the webhook token, not the bot token.
    pub async fn execute_webhook(&self, id: &str, token: &str, body: Value) -> Result<Value> {
        let resp = self
            .request(
                Method::POST,
                &format!("/webhooks/{id}/{token}?wait=true"),
                Some(body),
                false,
            )
            .await
            .context("execute Discord webhook")?;
        resp.json().await.context("parse Discord webhook message JSON")
    }

    pub async fn gateway_url(&self) -> Result<String> {
        let resp = self
            .request(Method::GET, "/gateway/bot", None, true)
            .await
            .context("fetch Discord gateway URL")?;
        let v: Value = resp.json().await.context("parse Discord gateway response")?;
        Ok(v.get("url")
            .and_then(Value::as_str)
            .unwrap_or("wss://gateway.discord.gg")
            .to_string())
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
        bot_auth: bool,
    ) -> Result<Response> {
        let url = self.url(path);

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let mut builder = self.client.request(method.clone(), &url);
            if bot_auth {
                builder = builder.header("Authorization", format!("Bot {}", self.bot_token));
            }
            if let Some(payload) = &body {
                builder = builder.json(payload);
            }

            let resp = builder
                .send()
                .await
                .with_context(|| format!("send Discord request {} {path}", method.as_str()))?;

            if resp.status().as_u16() == 429 {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    anyhow::bail!(
                        "Discord request {} {path} exceeded rate limit after {MAX_RATE_LIMIT_RETRIES} retries",
                        method.as_str()
                    );
                }
                let wait = parse_retry_after(resp.headers()).unwrap_or(Duration::from_secs(1));
                tracing::warn!(
                    "Discord 429 on {} {path}, retrying in {}ms",
                    method.as_str(),
                    wait.as_millis()
                );
                sleep(wait).await;
                continue;
            }

            if !resp.status().is_success() {
                let status = resp.status();
                let text = resp
                    .text()
                    .await
                    .unwrap_or_else(|e| format!("<failed to read response body: {e}>"));
                anyhow::bail!(
                    "Discord request {} {path} failed ({status}): {text}",
                    method.as_str()
                );
            }

            return Ok(resp);
        }

        anyhow::bail!(
            "Discord request {} {path} failed due to rate limiting",
            method.as_str()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn emoji_is_percent_encoded() {
        assert_eq!(encode_emoji("🔄"), "%F0%9F%94%84");
        assert_eq!(encode_emoji("🇰🇷"), "%F0%9F%87%B0%F0%9F%87%B7");
        assert_eq!(encode_emoji("name:123"), "name:123");
    }

    #[test]
    fn parses_retry_after_float_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("Retry-After", HeaderValue::from_static("1.75"));
        let d = parse_retry_after(&headers).unwrap();
        assert_eq!(d.as_millis(), 1750);

        headers.insert("Retry-After", HeaderValue::from_static("-1"));
        assert_eq!(parse_retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn missing_retry_after_is_none() {
        assert!(parse_retry_after(&HeaderMap::new()).is_none());
    }
}
