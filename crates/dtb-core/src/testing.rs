//! Hand-written fakes for the core ports, shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    backend::{BackendError, BackendKind, BackendTranslation, TokenUsage, TranslationBackend},
    domain::{Author, ChannelId, IncomingMessage, MessageId, MessageRef, ServerId, UserId},
    errors::Error,
    language::{Language, Mode},
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, WebhookHandle, WebhookIdentity},
    },
    server_config::{ServerConfig, ServerConfigPort, ServerDefaults, ServerStats, StatsDelta},
    Result,
};

pub(crate) const TEST_CHANNEL: ChannelId = ChannelId(100);
pub(crate) const TEST_SERVER: ServerId = ServerId(1);

/// Let detached tasks spawned on the current-thread test runtime run.
pub(crate) async fn settle() {
    for _ in 0..50 {
        tokio::task::yield_now().await;
    }
}

pub(crate) fn incoming(id: u64, content: &str) -> IncomingMessage {
    IncomingMessage {
        message: MessageRef {
            channel_id: TEST_CHANNEL,
            message_id: MessageId(id),
        },
        server_id: TEST_SERVER,
        author: Author {
            id: UserId(42),
            name: "mina".to_string(),
            is_bot: false,
        },
        content: content.to_string(),
    }
}

// ============== Backend ==============

#[derive(Clone, Debug)]
pub(crate) enum FakeReply {
    Ok { text: String, tokens: TokenUsage },
    RateLimited,
    ApiError,
}

impl FakeReply {
    pub(crate) fn ok(text: &str, prompt: u64, completion: u64) -> Self {
        FakeReply::Ok {
            text: text.to_string(),
            tokens: TokenUsage::new(prompt, completion),
        }
    }
}

pub(crate) struct FakeBackend {
    detected: Option<Language>,
    reply: FakeReply,
    detect_calls: AtomicUsize,
    translate_calls: Mutex<Vec<(BackendKind, String, Language, Mode)>>,
}

impl FakeBackend {
    pub(crate) fn new(detected: Language, reply: FakeReply) -> Self {
        Self {
            detected: Some(detected),
            reply,
            detect_calls: AtomicUsize::new(0),
            translate_calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing_detection(reply: FakeReply) -> Self {
        Self {
            detected: None,
            ..Self::new(Language::Eng, reply)
        }
    }

    pub(crate) fn detect_calls(&self) -> usize {
        self.detect_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn translate_calls(&self) -> usize {
        self.translate_calls.lock().unwrap().len()
    }

    /// Texts sent to `translate`, in call order.
    pub(crate) fn translated_texts(&self) -> Vec<String> {
        self.translate_calls
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.1.clone())
            .collect()
    }

    pub(crate) fn last_kind(&self) -> Option<BackendKind> {
        self.translate_calls.lock().unwrap().last().map(|c| c.0)
    }
}

#[async_trait]
impl TranslationBackend for FakeBackend {
    async fn detect_language(&self, _text: &str) -> std::result::Result<Language, BackendError> {
        self.detect_calls.fetch_add(1, Ordering::SeqCst);
        self.detected.ok_or_else(|| BackendError::Transport {
            provider: "fake",
            message: "detector offline".to_string(),
        })
    }

    async fn translate(
        &self,
        kind: BackendKind,
        text: &str,
        source: Language,
        mode: Mode,
    ) -> std::result::Result<BackendTranslation, BackendError> {
        self.translate_calls
            .lock()
            .unwrap()
            .push((kind, text.to_string(), source, mode));
        match &self.reply {
            FakeReply::Ok { text, tokens } => Ok(BackendTranslation {
                translation: text.clone(),
                tokens: *tokens,
            }),
            FakeReply::RateLimited => Err(BackendError::RateLimited {
                provider: "fake",
                message: "slow down".to_string(),
            }),
            FakeReply::ApiError => Err(BackendError::Api {
                provider: "fake",
                status: 500,
                message: "internal".to_string(),
            }),
        }
    }
}

// ============== Messenger ==============

#[derive(Default)]
pub(crate) struct FakeMessenger {
    next_id: AtomicU64,
    fail_webhooks: AtomicBool,
    // Successful webhook posts left before every further post fails.
    webhook_budget: Mutex<Option<usize>>,
    no_webhooks: bool,
    max_message_len: Option<usize>,
    channel_messages: Mutex<Vec<(ChannelId, String)>>,
    replies: Mutex<Vec<(MessageRef, String)>>,
    added: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    clears: AtomicUsize,
    webhook_lookups: AtomicUsize,
    webhook_posts: Mutex<Vec<(String, String)>>,
}

impl FakeMessenger {
    pub(crate) fn failing_webhooks() -> Self {
        let m = Self::default();
        m.fail_webhooks.store(true, Ordering::SeqCst);
        m
    }

    pub(crate) fn webhooks_fail_after(posts: usize) -> Self {
        let m = Self::default();
        *m.webhook_budget.lock().unwrap() = Some(posts);
        m
    }

    pub(crate) fn without_webhooks(max_message_len: usize) -> Self {
        Self {
            no_webhooks: true,
            max_message_len: Some(max_message_len),
            ..Self::default()
        }
    }

    fn alloc(&self, channel_id: ChannelId) -> MessageRef {
        MessageRef {
            channel_id,
            message_id: MessageId(1000 + self.next_id.fetch_add(1, Ordering::SeqCst)),
        }
    }

    pub(crate) fn channel_messages(&self) -> Vec<(ChannelId, String)> {
        self.channel_messages.lock().unwrap().clone()
    }

    pub(crate) fn replies(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub(crate) fn reactions_added(&self) -> Vec<String> {
        self.added.lock().unwrap().clone()
    }

    pub(crate) fn reactions_removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    pub(crate) fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    pub(crate) fn webhook_lookups(&self) -> usize {
        self.webhook_lookups.load(Ordering::SeqCst)
    }

    /// `(username, content)` per webhook post.
    pub(crate) fn webhook_posts(&self) -> Vec<(String, String)> {
        self.webhook_posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_webhooks: !self.no_webhooks,
            max_message_len: self.max_message_len.unwrap_or(2000),
        }
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageRef> {
        self.channel_messages
            .lock()
            .unwrap()
            .push((channel, content.to_string()));
        Ok(self.alloc(channel))
    }

    async fn reply(&self, to: MessageRef, content: &str) -> Result<MessageRef> {
        self.replies.lock().unwrap().push((to, content.to_string()));
        Ok(self.alloc(to.channel_id))
    }

    async fn add_reaction(&self, _msg: MessageRef, emoji: &str) -> Result<()> {
        self.added.lock().unwrap().push(emoji.to_string());
        Ok(())
    }

    async fn remove_own_reaction(&self, _msg: MessageRef, emoji: &str) -> Result<()> {
        self.removed.lock().unwrap().push(emoji.to_string());
        Ok(())
    }

    async fn clear_reactions(&self, _msg: MessageRef) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn find_or_create_webhook(
        &self,
        channel: ChannelId,
        name: &str,
    ) -> Result<WebhookHandle> {
        self.webhook_lookups.fetch_add(1, Ordering::SeqCst);
        if self.fail_webhooks.load(Ordering::SeqCst) {
            return Err(Error::Delivery("missing Manage Webhooks permission".to_string()));
        }
        Ok(WebhookHandle {
            id: format!("wh-{channel}-{name}"),
            token: "token".to_string(),
            channel_id: channel,
        })
    }

    async fn execute_webhook(
        &self,
        webhook: &WebhookHandle,
        identity: &WebhookIdentity,
        content: &str,
    ) -> Result<MessageRef> {
        if let Some(left) = self.webhook_budget.lock().unwrap().as_mut() {
            if *left == 0 {
                return Err(Error::Delivery("Unknown Webhook".to_string()));
            }
            *left -= 1;
        }
        self.webhook_posts
            .lock()
            .unwrap()
            .push((identity.username.clone(), content.to_string()));
        Ok(self.alloc(webhook.channel_id))
    }
}

// ============== Server config ==============

pub(crate) struct FakeServerConfig {
    defaults: ServerDefaults,
    fail_writes: bool,
    configs: Mutex<HashMap<ServerId, ServerConfig>>,
}

impl Default for FakeServerConfig {
    fn default() -> Self {
        Self {
            defaults: ServerDefaults::default(),
            fail_writes: false,
            configs: Mutex::new(HashMap::new()),
        }
    }
}

impl FakeServerConfig {
    pub(crate) fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub(crate) fn stats(&self, server: ServerId) -> ServerStats {
        self.snapshot(server).stats
    }

    pub(crate) fn snapshot(&self, server: ServerId) -> ServerConfig {
        self.configs
            .lock()
            .unwrap()
            .entry(server)
            .or_insert_with(|| self.defaults.to_config())
            .clone()
    }
}

#[async_trait]
impl ServerConfigPort for FakeServerConfig {
    async fn load(&self, server: ServerId) -> ServerConfig {
        self.snapshot(server)
    }

    async fn save(&self, server: ServerId, cfg: &ServerConfig) -> Result<()> {
        if self.fail_writes {
            return Err(Error::External("disk full".to_string()));
        }
        self.configs
            .lock()
            .unwrap()
            .entry(server)
            .or_insert_with(|| self.defaults.to_config())
            .apply_settings(cfg);
        Ok(())
    }

    async fn update_stats(&self, server: ServerId, delta: StatsDelta) -> Result<()> {
        if self.fail_writes {
            return Err(Error::External("disk full".to_string()));
        }
        let mut configs = self.configs.lock().unwrap();
        let cfg = configs
            .entry(server)
            .or_insert_with(|| self.defaults.to_config());
        cfg.apply_stats(delta);
        Ok(())
    }
}
