//! Discord gateway WebSocket: hello, identify, heartbeat, dispatch, reconnect.

use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use crate::http::DiscordHttp;

/// GUILDS | GUILD_MESSAGES | DIRECT_MESSAGES | MESSAGE_CONTENT
pub const DEFAULT_INTENTS: u64 = 37377;

const DEFAULT_HEARTBEAT_MS: u64 = 41_250;
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Dispatches forwarded to the router.
#[derive(Debug)]
pub enum GatewayEvent {
    Ready(Value),
    MessageCreate(Value),
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub intents: u64,
    /// "Playing ..." presence shown under the bot's name.
    pub activity: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            intents: DEFAULT_INTENTS,
            activity: None,
        }
    }
}

/// How a single connection ended.
#[derive(Debug, PartialEq, Eq)]
enum SessionEnd {
    Cancelled,
    ReceiverClosed,
    Reconnect,
}

pub struct Gateway {
    http: DiscordHttp,
    cfg: GatewayConfig,
}

impl Gateway {
    pub fn new(http: DiscordHttp, cfg: GatewayConfig) -> Self {
        Self { http, cfg }
    }

    /// Keep a gateway connection alive until `cancel` fires or the receiver goes away.
    pub async fn run(
        &self,
        tx: mpsc::Sender<GatewayEvent>,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let mut backoff = Duration::from_secs(1);

        loop {
            match self.connect_once(&tx, &cancel).await {
                Ok(SessionEnd::Cancelled) | Ok(SessionEnd::ReceiverClosed) => return Ok(()),
                Ok(SessionEnd::Reconnect) => {
                    backoff = Duration::from_secs(1);
                }
                Err(e) => {
                    if e.downcast_ref::<FatalClose>().is_some() {
                        return Err(e);
                    }
                    tracing::warn!("Discord gateway error: {e:#}");
                }
            }

            tracing::info!("Discord: reconnecting in {}s", backoff.as_secs());
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = (backoff * 2).min(MAX_BACKOFF);
        }
    }

    async fn connect_once(
        &self,
        tx: &mpsc::Sender<GatewayEvent>,
        cancel: &CancellationToken,
    ) -> anyhow::Result<SessionEnd> {
        let gw_url = self.http.gateway_url().await?;
        let ws_url = format!("{gw_url}/?v=10&encoding=json");
        tracing::info!("Discord: connecting to gateway...");

        let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
            .await
            .context("connect to Discord gateway WebSocket")?;
        let (mut write, mut read) = ws_stream.split();

        let hello = read
            .next()
            .await
            .ok_or_else(|| anyhow::anyhow!("gateway closed before hello"))?
            .context("read Discord gateway hello message")?;
        let hello: Value =
            serde_json::from_str(&hello.to_string()).context("parse Discord gateway hello event")?;
        let heartbeat_ms = heartbeat_interval(&hello);

        let identify = identify_payload(self.http.token(), &self.cfg);
        write
            .send(Message::Text(identify.to_string().into()))
            .await
            .context("send Discord gateway identify")?;
        tracing::info!("Discord: connected and identified");

        let mut sequence: Option<i64> = None;
        let mut awaiting_ack = false;
        let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_ms));
        heartbeat.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.send(Message::Close(None)).await;
                    return Ok(SessionEnd::Cancelled);
                }
                _ = heartbeat.tick() => {
                    if awaiting_ack {
                        tracing::warn!("Discord: heartbeat not acknowledged, reconnecting");
                        return Ok(SessionEnd::Reconnect);
                    }
                    write
                        .send(Message::Text(heartbeat_payload(sequence).to_string().into()))
                        .await
                        .context("send Discord heartbeat")?;
                    awaiting_ack = true;
                }
                msg = read.next() => {
                    let text = match msg {
                        Some(Ok(Message::Text(t))) => t,
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code));
                            if let Some(code) = code.filter(|c| is_fatal_close(*c)) {
                                return Err(FatalClose(code).into());
                            }
                            tracing::warn!("Discord: gateway closed ({code:?})");
                            return Ok(SessionEnd::Reconnect);
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(e)) => return Err(e).context("read Discord gateway frame"),
                        None => return Ok(SessionEnd::Reconnect),
                    };

                    let event: Value = match serde_json::from_str(&text) {
                        Ok(e) => e,
                        Err(_) => continue,
                    };

                    if let Some(s) = event.get("s").and_then(Value::as_i64) {
                        sequence = Some(s);
                    }

                    match event.get("op").and_then(Value::as_u64).unwrap_or(0) {
                        1 => {
                            write
                                .send(Message::Text(heartbeat_payload(sequence).to_string().into()))
                                .await
                                .context("send Discord heartbeat")?;
                            continue;
                        }
                        7 => {
                            tracing::warn!("Discord: received Reconnect (op 7)");
                            return Ok(SessionEnd::Reconnect);
                        }
                        9 => {
                            tracing::warn!("Discord: received Invalid Session (op 9)");
                            return Ok(SessionEnd::Reconnect);
                        }
                        11 => {
                            awaiting_ack = false;
                            continue;
                        }
                        _ => {}
                    }

                    let Some(forward) = dispatch_event(event) else {
                        continue;
                    };
                    if tx.send(forward).await.is_err() {
                        return Ok(SessionEnd::ReceiverClosed);
                    }
                }
            }
        }
    }
}

/// Close codes after which reconnecting cannot succeed (bad token, bad intents).
#[derive(Debug, thiserror::Error)]
#[error("Discord gateway closed with fatal code {0}")]
pub struct FatalClose(pub u16);

fn is_fatal_close(code: u16) -> bool {
    matches!(code, 4004 | 4010 | 4011 | 4012 | 4013 | 4014)
}

fn heartbeat_interval(hello: &Value) -> u64 {
    hello
        .get("d")
        .and_then(|d| d.get("heartbeat_interval"))
        .and_then(Value::as_u64)
        .unwrap_or(DEFAULT_HEARTBEAT_MS)
}

fn heartbeat_payload(sequence: Option<i64>) -> Value {
    json!({ "op": 1, "d": sequence })
}

fn identify_payload(token: &str, cfg: &GatewayConfig) -> Value {
    let mut d = json!({
        "token": token,
        "intents": cfg.intents,
        "properties": {
            "os": std::env::consts::OS,
            "browser": "dtb",
            "device": "dtb"
        }
    });
    if let Some(name) = &cfg.activity {
        d["presence"] = json!({
            "activities": [{ "name": name, "type": 0 }],
            "status": "online",
            "since": null,
            "afk": false
        });
    }
    json!({ "op": 2, "d": d })
}

fn dispatch_event(mut event: Value) -> Option<GatewayEvent> {
    let kind = event.get("t").and_then(Value::as_str)?.to_string();
    let d = event.get_mut("d").map(Value::take)?;
    match kind.as_str() {
        "READY" => Some(GatewayEvent::Ready(d)),
        "MESSAGE_CREATE" => Some(GatewayEvent::MessageCreate(d)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_cover_guild_messages_and_content() {
        assert_ne!(DEFAULT_INTENTS & 1, 0, "GUILDS");
        assert_ne!(DEFAULT_INTENTS & 512, 0, "GUILD_MESSAGES");
        assert_ne!(DEFAULT_INTENTS & 32768, 0, "MESSAGE_CONTENT");
    }

    #[test]
    fn hello_interval_with_fallback() {
        let hello = json!({"op": 10, "d": {"heartbeat_interval": 45000}});
        assert_eq!(heartbeat_interval(&hello), 45000);
        assert_eq!(heartbeat_interval(&json!({"op": 10})), DEFAULT_HEARTBEAT_MS);
    }

    #[test]
    fn heartbeat_carries_last_sequence() {
        assert_eq!(heartbeat_payload(None), json!({"op": 1, "d": null}));
        assert_eq!(heartbeat_payload(Some(42)), json!({"op": 1, "d": 42}));
    }

    #[test]
    fn identify_includes_presence_when_configured() {
        let cfg = GatewayConfig {
            activity: Some("!help | Translating...".to_string()),
            ..GatewayConfig::default()
        };
        let v = identify_payload("tok", &cfg);
        assert_eq!(v["op"], 2);
        assert_eq!(v["d"]["token"], "tok");
        assert_eq!(v["d"]["intents"], DEFAULT_INTENTS);
        assert_eq!(
            v["d"]["presence"]["activities"][0]["name"],
            "!help | Translating..."
        );

        let bare = identify_payload("tok", &GatewayConfig::default());
        assert!(bare["d"].get("presence").is_none());
    }

    #[test]
    fn only_ready_and_message_create_are_forwarded() {
        let msg = json!({"op": 0, "t": "MESSAGE_CREATE", "s": 3, "d": {"id": "1"}});
        assert!(matches!(
            dispatch_event(msg),
            Some(GatewayEvent::MessageCreate(d)) if d["id"] == "1"
        ));
        assert!(matches!(
            dispatch_event(json!({"op": 0, "t": "READY", "d": {}})),
            Some(GatewayEvent::Ready(_))
        ));
        assert!(dispatch_event(json!({"op": 0, "t": "TYPING_START", "d": {}})).is_none());
        assert!(dispatch_event(json!({"op": 11})).is_none());
    }

    #[test]
    fn authentication_failures_are_fatal() {
        assert!(is_fatal_close(4004));
        assert!(is_fatal_close(4014));
        assert!(!is_fatal_close(4000));
        assert!(!is_fatal_close(1000));
    }
}
