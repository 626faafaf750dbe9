use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChannelId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{MessagingCapabilities, WebhookHandle, WebhookIdentity},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* Discord API calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls touching the same channel.
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Discord allows 50 req/s globally and roughly 5 per 5 s per channel route.
        Self {
            global_min_interval: Duration::from_millis(25),
            per_channel_min_interval: Duration::from_millis(250),
        }
    }
}

#[derive(Debug)]
struct IntervalLimiter {
    interval: Duration,
    next: Instant,
}

impl IntervalLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// Reserve the next slot and return the wait duration required before executing.
    fn reserve(&mut self) -> Duration {
        let now = Instant::now();
        let start = if now >= self.next { now } else { self.next };
        self.next = start + self.interval;
        start.saturating_duration_since(now)
    }
}

/// MessagingPort decorator that spaces out outbound calls.
///
/// Best-effort: it keeps the bot under Discord's buckets during bursts (several
/// parts plus reactions per message) but the adapter still handles 429s.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_channel: Mutex<HashMap<ChannelId, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_channel: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_channel(&self, channel: ChannelId) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_channel.lock().await;
        map.entry(channel)
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_channel_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle(&self, channel: ChannelId) {
        let global_wait = { self.global.lock().await.reserve() };
        let channel_wait = {
            let lim = self.limiter_for_channel(channel).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(channel_wait);
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_message(&self, channel: ChannelId, content: &str) -> Result<MessageRef> {
        self.throttle(channel).await;
        self.inner.send_message(channel, content).await
    }

    async fn reply(&self, to: MessageRef, content: &str) -> Result<MessageRef> {
        self.throttle(to.channel_id).await;
        self.inner.reply(to, content).await
    }

    async fn add_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.throttle(msg.channel_id).await;
        self.inner.add_reaction(msg, emoji).await
    }

    async fn remove_own_reaction(&self, msg: MessageRef, emoji: &str) -> Result<()> {
        self.throttle(msg.channel_id).await;
        self.inner.remove_own_reaction(msg, emoji).await
    }

    async fn clear_reactions(&self, msg: MessageRef) -> Result<()> {
        self.throttle(msg.channel_id).await;
        self.inner.clear_reactions(msg).await
    }

    async fn find_or_create_webhook(
        &self,
        channel: ChannelId,
        name: &str,
    ) -> Result<WebhookHandle> {
        self.throttle(channel).await;
        self.inner.find_or_create_webhook(channel, name).await
    }

    async fn execute_webhook(
        &self,
        webhook: &WebhookHandle,
        identity: &WebhookIdentity,
        content: &str,
    ) -> Result<MessageRef> {
        self.throttle(webhook.channel_id).await;
        self.inner.execute_webhook(webhook, identity, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMessenger;

    #[test]
    fn limiter_spaces_reservations() {
        let mut lim = IntervalLimiter::new(Duration::from_millis(100));
        assert_eq!(lim.reserve(), Duration::ZERO);
        let second = lim.reserve();
        assert!(second > Duration::from_millis(50));
        assert!(second <= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn forwards_calls_to_inner_messenger() {
        let fake = Arc::new(FakeMessenger::default());
        let throttled = ThrottledMessenger::new(
            fake.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(1),
                per_channel_min_interval: Duration::from_millis(1),
            },
        );

        throttled.send_message(ChannelId(4), "hi").await.unwrap();
        let msg = MessageRef {
            channel_id: ChannelId(4),
            message_id: crate::domain::MessageId(1),
        };
        throttled.add_reaction(msg, "🇰🇷").await.unwrap();

        assert_eq!(fake.channel_messages(), vec![(ChannelId(4), "hi".to_string())]);
        assert_eq!(fake.reactions_added(), vec!["🇰🇷".to_string()]);
    }
}
