//! Posting translations (and failure notices) back into the channel.
//!
//! Webhooks are preferred so the post can carry a per-backend identity; a plain
//! reply is the fallback when the webhook path fails.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use crate::{
    domain::{ChannelId, IncomingMessage, MessageRef},
    formatting::{format_translation, split_for_delivery},
    messaging::{
        port::MessagingPort,
        types::{WebhookHandle, WebhookIdentity},
    },
    pipeline::{TranslationFailure, TranslationResult},
    Error, Result,
};

const ERROR_IDENTITY: &str = "Translation Error";

/// Per-channel webhook handles, resolved lazily by name.
pub struct WebhookCache {
    messenger: Arc<dyn MessagingPort>,
    name: String,
    handles: Mutex<HashMap<ChannelId, WebhookHandle>>,
}

impl WebhookCache {
    pub fn new(messenger: Arc<dyn MessagingPort>, name: impl Into<String>) -> Self {
        Self {
            messenger,
            name: name.into(),
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub async fn get_or_create(&self, channel: ChannelId) -> Result<WebhookHandle> {
        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get(&channel) {
            return Ok(handle.clone());
        }
        let handle = self
            .messenger
            .find_or_create_webhook(channel, &self.name)
            .await?;
        tracing::debug!("Resolved webhook {} for channel {channel}", handle.id);
        handles.insert(channel, handle.clone());
        Ok(handle)
    }

    /// Forget a handle that stopped working (deleted webhook, lost permission).
    pub async fn invalidate(&self, channel: ChannelId) {
        self.handles.lock().await.remove(&channel);
    }

    pub async fn clear(&self) {
        self.handles.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.handles.lock().await.len()
    }
}

#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub safe_limit: usize,
    pub part_delay: Duration,
    pub avatar_url: Option<String>,
    pub error_avatar_url: Option<String>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            safe_limit: 1950,
            part_delay: Duration::from_millis(500),
            avatar_url: None,
            error_avatar_url: None,
        }
    }
}

pub struct Delivery {
    messenger: Arc<dyn MessagingPort>,
    webhooks: WebhookCache,
    use_webhooks: bool,
    budget: usize,
    cfg: DeliveryConfig,
}

/// Webhook posting stopped after `sent` parts went out.
struct WebhookStopped {
    sent: usize,
    error: Error,
}

impl Delivery {
    pub fn new(
        messenger: Arc<dyn MessagingPort>,
        webhook_name: impl Into<String>,
        cfg: DeliveryConfig,
    ) -> Self {
        let caps = messenger.capabilities();
        let webhooks = WebhookCache::new(Arc::clone(&messenger), webhook_name);
        Self {
            messenger,
            webhooks,
            use_webhooks: caps.supports_webhooks,
            budget: cfg.safe_limit.min(caps.max_message_len),
            cfg,
        }
    }

    pub fn webhooks(&self) -> &WebhookCache {
        &self.webhooks
    }

    pub async fn deliver_translation(
        &self,
        msg: &IncomingMessage,
        result: &TranslationResult,
    ) -> Result<()> {
        let body = format_translation(result);
        if !self.use_webhooks {
            return self.reply_in_parts(msg.message, &self.split(&body)).await;
        }

        let identity = WebhookIdentity::new(
            format!("Translator ({})", result.served_by.label()),
            self.cfg.avatar_url.clone(),
        );
        let parts = self.split(&format!("**{}**: {body}", msg.author.name));

        match self.send_via_webhook(msg.channel_id(), &identity, &parts).await {
            Ok(()) => Ok(()),
            Err(WebhookStopped { sent: 0, error }) => {
                tracing::warn!("Webhook failed, falling back to reply: {error}");
                self.reply_in_parts(msg.message, &self.split(&body)).await
            }
            Err(WebhookStopped { sent, error }) => {
                tracing::warn!(
                    "Webhook failed after {sent} of {} parts, replying with the rest: {error}",
                    parts.len()
                );
                self.reply_in_parts(msg.message, &parts[sent..]).await
            }
        }
    }

    /// Exactly one user-visible notice per failed message.
    pub async fn deliver_error(
        &self,
        msg: &IncomingMessage,
        failure: &TranslationFailure,
    ) -> Result<()> {
        let text = failure.kind.user_message();
        if self.use_webhooks {
            let identity =
                WebhookIdentity::new(ERROR_IDENTITY, self.cfg.error_avatar_url.clone());
            let notice = [format!("**Error**: {text}")];
            match self.send_via_webhook(msg.channel_id(), &identity, &notice).await {
                Ok(()) => return Ok(()),
                Err(stopped) => {
                    tracing::warn!("Error webhook failed, falling back to reply: {}", stopped.error)
                }
            }
        }
        self.messenger.reply(msg.message, text).await.map(|_| ())
    }

    fn split(&self, content: &str) -> Vec<String> {
        split_for_delivery(content, self.budget)
    }

    async fn send_via_webhook(
        &self,
        channel: ChannelId,
        identity: &WebhookIdentity,
        parts: &[String],
    ) -> std::result::Result<(), WebhookStopped> {
        let handle = self
            .webhooks
            .get_or_create(channel)
            .await
            .map_err(|error| WebhookStopped { sent: 0, error })?;
        let last = parts.len().saturating_sub(1);

        for (i, part) in parts.iter().enumerate() {
            if let Err(error) = self.messenger.execute_webhook(&handle, identity, part).await {
                self.webhooks.invalidate(channel).await;
                return Err(WebhookStopped { sent: i, error });
            }
            if i < last {
                tokio::time::sleep(self.cfg.part_delay).await;
            }
        }
        Ok(())
    }

    /// First part replies to the original; the rest are plain channel messages.
    async fn reply_in_parts(&self, original: MessageRef, parts: &[String]) -> Result<()> {
        let last = parts.len().saturating_sub(1);

        for (i, part) in parts.iter().enumerate() {
            if i == 0 {
                self.messenger.reply(original, part).await?;
            } else {
                self.messenger.send_message(original.channel_id, part).await?;
            }
            if i < last {
                tokio::time::sleep(self.cfg.part_delay).await;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        backend::{BackendKind, TokenUsage},
        language::Language,
        pipeline::{FailureKind, ServedBy},
        testing::{incoming, FakeMessenger, TEST_CHANNEL},
    };

    fn delivery(messenger: Arc<FakeMessenger>, safe_limit: usize) -> Delivery {
        Delivery::new(
            messenger,
            "TranslationBot",
            DeliveryConfig {
                safe_limit,
                part_delay: Duration::ZERO,
                ..DeliveryConfig::default()
            },
        )
    }

    fn result(text: &str, served_by: ServedBy) -> TranslationResult {
        TranslationResult {
            original: "원문".to_string(),
            translated: text.to_string(),
            source: Language::Kor,
            target: Language::Eng,
            served_by,
            tokens: TokenUsage::new(30, 12),
            latency: None,
        }
    }

    #[tokio::test]
    async fn webhook_post_carries_author_and_backend_identity() {
        let fake = Arc::new(FakeMessenger::default());
        let d = delivery(fake.clone(), 1950);

        d.deliver_translation(
            &incoming(1, "원문"),
            &result("Hello", ServedBy::Backend(BackendKind::Claude)),
        )
        .await
        .unwrap();

        assert_eq!(
            fake.webhook_posts(),
            vec![(
                "Translator (claude)".to_string(),
                "**mina**: Hello\n📊 Tokens: 42".to_string()
            )]
        );
        assert!(fake.replies().is_empty());
    }

    #[tokio::test]
    async fn cached_result_has_cache_identity_and_no_footer() {
        let fake = Arc::new(FakeMessenger::default());
        let d = delivery(fake.clone(), 1950);

        d.deliver_translation(&incoming(1, "원문"), &result("Hello", ServedBy::Cache))
            .await
            .unwrap();

        assert_eq!(
            fake.webhook_posts(),
            vec![("Translator (cache)".to_string(), "**mina**: Hello".to_string())]
        );
    }

    #[tokio::test]
    async fn webhook_handle_is_cached_per_channel() {
        let fake = Arc::new(FakeMessenger::default());
        let d = delivery(fake.clone(), 1950);
        let msg = incoming(1, "원문");

        for _ in 0..3 {
            d.deliver_translation(&msg, &result("Hi", ServedBy::Cache))
                .await
                .unwrap();
        }
        assert_eq!(fake.webhook_lookups(), 1);
        assert_eq!(d.webhooks().len().await, 1);

        d.webhooks().clear().await;
        assert_eq!(d.webhooks().len().await, 0);
    }

    #[tokio::test]
    async fn long_translation_is_posted_in_labelled_parts() {
        let fake = Arc::new(FakeMessenger::default());
        let d = delivery(fake.clone(), 40);
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));

        d.deliver_translation(&incoming(1, "원문"), &result(&text, ServedBy::Cache))
            .await
            .unwrap();

        let posts = fake.webhook_posts();
        assert!(posts.len() > 1);
        let total = posts.len();
        for (i, (_, content)) in posts.iter().enumerate() {
            assert!(content.starts_with(&format!("[Part {}/{}] ", i + 1, total)));
        }
    }

    #[tokio::test]
    async fn webhook_failure_falls_back_to_reply_then_channel_sends() {
        let fake = Arc::new(FakeMessenger::failing_webhooks());
        let d = delivery(fake.clone(), 60);
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));

        d.deliver_translation(&incoming(1, "원문"), &result(&text, ServedBy::Cache))
            .await
            .unwrap();

        let replies = fake.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with("[Part 1/2] "));
        let sends = fake.channel_messages();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].0, TEST_CHANNEL);
        assert!(sends[0].1.starts_with("[Part 2/2] "));
    }

    #[tokio::test]
    async fn webhook_failure_mid_message_resumes_at_the_failed_part() {
        let fake = Arc::new(FakeMessenger::webhooks_fail_after(1));
        let d = delivery(fake.clone(), 60);
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));

        d.deliver_translation(&incoming(1, "원문"), &result(&text, ServedBy::Cache))
            .await
            .unwrap();

        let posts = fake.webhook_posts();
        assert_eq!(posts.len(), 1);
        assert!(posts[0].1.starts_with("[Part 1/2] **mina**: aaa"));
        assert_eq!(fake.replies(), vec![format!("[Part 2/2] {}", "b".repeat(30))]);
        assert!(fake.channel_messages().is_empty());
    }

    #[tokio::test]
    async fn messenger_limits_cap_the_configured_budget() {
        let fake = Arc::new(FakeMessenger::without_webhooks(50));
        let d = delivery(fake.clone(), 1950);
        let text = format!("{}\n{}", "a".repeat(30), "b".repeat(30));

        d.deliver_translation(&incoming(1, "원문"), &result(&text, ServedBy::Cache))
            .await
            .unwrap();

        assert_eq!(fake.webhook_lookups(), 0);
        let replies = fake.replies();
        let sends = fake.channel_messages();
        assert_eq!(replies.len(), 1);
        assert_eq!(sends.len(), 1);
        assert!(replies[0].chars().count() <= 50);
        assert!(sends[0].1.chars().count() <= 50);
    }

    #[tokio::test]
    async fn error_notice_prefers_webhook() {
        let fake = Arc::new(FakeMessenger::default());
        let d = delivery(fake.clone(), 1950);
        let failure = TranslationFailure {
            kind: FailureKind::RateLimit,
            detail: "429".to_string(),
        };

        d.deliver_error(&incoming(1, "원문"), &failure).await.unwrap();

        assert_eq!(
            fake.webhook_posts(),
            vec![(
                "Translation Error".to_string(),
                "**Error**: ❌ Rate limit exceeded. Please try again in a few moments.".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn error_notice_falls_back_to_single_reply() {
        let fake = Arc::new(FakeMessenger::failing_webhooks());
        let d = delivery(fake.clone(), 1950);
        let failure = TranslationFailure {
            kind: FailureKind::Unknown,
            detail: "boom".to_string(),
        };

        d.deliver_error(&incoming(1, "원문"), &failure).await.unwrap();
        assert_eq!(
            fake.replies(),
            vec!["❌ Failed to translate message. Please try again later.".to_string()]
        );
    }
}
