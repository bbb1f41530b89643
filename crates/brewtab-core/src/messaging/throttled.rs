use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChannelId, MessageRef, UserId},
    messaging::{
        port::ChatPort,
        types::{
            BotIdentity, ControlMessage, DirectoryUser, HistoryMessage, MessagingCapabilities,
        },
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Minimum spacing between *any* two API calls.
    pub global_min_interval: Duration,
    /// Minimum spacing between calls touching the same channel.
    pub per_channel_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        // Slack tier 3/4 methods allow ~50-100/min; chat.postMessage ~1/sec per channel.
        Self {
            global_min_interval: Duration::from_millis(100),
            per_channel_min_interval: Duration::from_millis(1050),
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

/// ChatPort decorator that spaces out outbound calls.
///
/// The monthly broadcast touches every user in the directory back to back;
/// this keeps that burst under the platform's rate limits. It does not
/// retry anything.
pub struct ThrottledChat {
    inner: Arc<dyn ChatPort>,
    cfg: ThrottleConfig,
    global: Mutex<IntervalLimiter>,
    per_channel: Mutex<HashMap<String, Arc<Mutex<IntervalLimiter>>>>,
}

impl ThrottledChat {
    pub fn new(inner: Arc<dyn ChatPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(IntervalLimiter::new(cfg.global_min_interval)),
            per_channel: Mutex::new(HashMap::new()),
        }
    }

    async fn limiter_for_channel(&self, channel: &str) -> Arc<Mutex<IntervalLimiter>> {
        let mut map = self.per_channel.lock().await;
        map.entry(channel.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(IntervalLimiter::new(
                    self.cfg.per_channel_min_interval,
                )))
            })
            .clone()
    }

    async fn throttle_channel(&self, channel: &ChannelId) {
        let global_wait = { self.global.lock().await.reserve() };
        let channel_wait = {
            let lim = self.limiter_for_channel(&channel.0).await;
            let mut guard = lim.lock().await;
            guard.reserve()
        };

        let wait = global_wait.max(channel_wait);
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }

    async fn throttle_global(&self) {
        let wait = { self.global.lock().await.reserve() };
        if wait > Duration::ZERO {
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl ChatPort for ThrottledChat {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn bot_identity(&self) -> Result<BotIdentity> {
        self.throttle_global().await;
        self.inner.bot_identity().await
    }

    async fn open_direct_channel(&self, user: &UserId) -> Result<ChannelId> {
        self.throttle_global().await;
        self.inner.open_direct_channel(user).await
    }

    async fn post_message(&self, channel: &ChannelId, msg: &ControlMessage) -> Result<MessageRef> {
        self.throttle_channel(channel).await;
        self.inner.post_message(channel, msg).await
    }

    async fn update_message(&self, target: &MessageRef, msg: &ControlMessage) -> Result<()> {
        self.throttle_channel(&target.channel).await;
        self.inner.update_message(target, msg).await
    }

    async fn delete_message(&self, target: &MessageRef) -> Result<()> {
        self.throttle_channel(&target.channel).await;
        self.inner.delete_message(target).await
    }

    async fn post_ephemeral(&self, channel: &ChannelId, user: &UserId, text: &str) -> Result<()> {
        self.throttle_channel(channel).await;
        self.inner.post_ephemeral(channel, user, text).await
    }

    async fn channel_history(&self, channel: &ChannelId) -> Result<Vec<HistoryMessage>> {
        self.throttle_channel(channel).await;
        self.inner.channel_history(channel).await
    }

    async fn list_users(&self) -> Result<Vec<DirectoryUser>> {
        self.throttle_global().await;
        self.inner.list_users().await
    }

    async fn user_display_name(&self, user: &UserId) -> Result<String> {
        self.throttle_global().await;
        self.inner.user_display_name(user).await
    }
}
