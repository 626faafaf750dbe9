use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use crate::{
    domain::{ChannelId, ServerId},
    errors::Error,
    server_config::{ServerConfigPort, StatsDelta},
    Result,
};

/// An active translation session bound to one channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub channel_id: ChannelId,
    pub server_id: ServerId,
    pub started_at: DateTime<Utc>,
    pub translations: u64,
    pub total_tokens: u64,
}

/// What `end` reports back about a finished session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionSummary {
    pub channel_id: ChannelId,
    pub server_id: ServerId,
    pub duration: Duration,
    pub translations: u64,
    pub total_tokens: u64,
}

/// Per-channel session state machine (`NoSession` <-> `Active`).
///
/// Sessions are ephemeral and die with the process.
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ChannelId, Session>>,
    server_config: Arc<dyn ServerConfigPort>,
}

impl SessionRegistry {
    pub fn new(server_config: Arc<dyn ServerConfigPort>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            server_config,
        }
    }

    pub async fn start(&self, channel: ChannelId, server: ServerId) -> Result<Session> {
        let session = {
            let mut sessions = self.sessions.lock().await;
            if sessions.contains_key(&channel) {
                return Err(Error::AlreadyActive(channel));
            }
            let session = Session {
                channel_id: channel,
                server_id: server,
                started_at: Utc::now(),
                translations: 0,
                total_tokens: 0,
            };
            sessions.insert(channel, session.clone());
            session
        };

        tracing::info!("Session started in channel {channel} (server {server})");
        if let Err(e) = self
            .server_config
            .update_stats(server, StatsDelta::session_started())
            .await
        {
            tracing::warn!("Failed to record session start for server {server}: {e}");
        }
        Ok(session)
    }

    pub async fn end(&self, channel: ChannelId) -> Result<SessionSummary> {
        let session = self
            .sessions
            .lock()
            .await
            .remove(&channel)
            .ok_or(Error::NoActiveSession(channel))?;

        let duration = (Utc::now() - session.started_at)
            .to_std()
            .unwrap_or_default();
        tracing::info!(
            "Session ended in channel {channel}: {} translations, {} tokens",
            session.translations,
            session.total_tokens
        );
        Ok(SessionSummary {
            channel_id: session.channel_id,
            server_id: session.server_id,
            duration,
            translations: session.translations,
            total_tokens: session.total_tokens,
        })
    }

    /// Count one translation against the channel's session. Dropped silently
    /// when the session ended while the translation was in flight.
    pub async fn record_translation(&self, channel: ChannelId, tokens: u64) {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(&channel) {
            session.translations += 1;
            session.total_tokens += tokens;
        }
    }

    pub async fn is_active(&self, channel: ChannelId) -> bool {
        self.sessions.lock().await.contains_key(&channel)
    }

    pub async fn get(&self, channel: ChannelId) -> Option<Session> {
        self.sessions.lock().await.get(&channel).cloned()
    }

    pub async fn active_in_server(&self, server: ServerId) -> Vec<Session> {
        let mut out: Vec<Session> = self
            .sessions
            .lock()
            .await
            .values()
            .filter(|s| s.server_id == server)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.started_at);
        out
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
