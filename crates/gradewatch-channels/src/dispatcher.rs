//! Fan-out dispatcher — sends one message to every enabled channel.
//!
//! Channels run concurrently under a per-channel timeout. One channel's
//! failure (error, timeout, or panic) is recorded for that channel only
//! and never prevents the others from attempting delivery, and never
//! raises out of `dispatch`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use gradewatch_core::traits::NotificationChannel;

struct Registered {
    channel: Arc<dyn NotificationChannel>,
    enabled: bool,
}

/// Registry of named channels with fan-out delivery.
pub struct NotificationDispatcher {
    channels: HashMap<String, Registered>,
    channel_timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(channel_timeout: Duration) -> Self {
        Self {
            channels: HashMap::new(),
            channel_timeout,
        }
    }

    /// Register a channel. Names are unique; re-registration replaces.
    pub fn register(&mut self, channel: Arc<dyn NotificationChannel>) {
        let name = channel.name().to_string();
        tracing::info!("📮 Registered channel: {name}");
        self.channels.insert(
            name,
            Registered {
                channel,
                enabled: true,
            },
        );
    }

    /// Enable or disable a channel without unregistering it.
    pub fn set_enabled(&mut self, name: &str, enabled: bool) -> bool {
        match self.channels.get_mut(name) {
            Some(reg) => {
                reg.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.channels.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Send to every enabled channel concurrently.
    ///
    /// Returns channel_name → delivered for each enabled channel, only
    /// after all have completed or timed out. Each send runs in its own
    /// task, so even a panicking channel is recorded as a failure for
    /// that channel alone and never unwinds into the caller.
    pub async fn dispatch(&self, subject: &str, content: &str) -> HashMap<String, bool> {
        let sends = self
            .channels
            .values()
            .filter(|reg| reg.enabled)
            .map(|reg| {
                let channel = Arc::clone(&reg.channel);
                let subject = subject.to_string();
                let content = content.to_string();
                let timeout = self.channel_timeout;
                async move {
                    let name = channel.name().to_string();
                    let send = tokio::spawn({
                        let name = name.clone();
                        async move {
                            match tokio::time::timeout(timeout, channel.send(&subject, &content))
                                .await
                            {
                                Ok(Ok(())) => true,
                                Ok(Err(e)) => {
                                    tracing::warn!("⚠️ Channel '{name}' failed: {e}");
                                    false
                                }
                                Err(_) => {
                                    tracing::warn!(
                                        "⚠️ Channel '{name}' timed out after {}s",
                                        timeout.as_secs()
                                    );
                                    false
                                }
                            }
                        }
                    });
                    let delivered = match send.await {
                        Ok(delivered) => delivered,
                        Err(e) => {
                            tracing::warn!("⚠️ Channel '{name}' panicked: {e}");
                            false
                        }
                    };
                    (name, delivered)
                }
            });

        let results: HashMap<String, bool> = futures::future::join_all(sends)
            .await
            .into_iter()
            .collect();

        let failed: Vec<_> = results
            .iter()
            .filter(|(_, ok)| !**ok)
            .map(|(n, _)| n.as_str())
            .collect();
        if failed.is_empty() {
            tracing::info!("📣 Dispatched '{subject}' to {} channel(s)", results.len());
        } else {
            tracing::warn!("📣 Dispatched '{subject}'; failed channels: {failed:?}");
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use gradewatch_core::error::{GradewatchError, Result};
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedChannel {
        name: String,
        ok: bool,
        calls: AtomicU32,
    }

    impl FixedChannel {
        fn new(name: &str, ok: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.into(),
                ok,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl NotificationChannel for FixedChannel {
        fn name(&self) -> &str {
            &self.name
        }
        async fn send(&self, _subject: &str, _content: &str) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.ok {
                Ok(())
            } else {
                Err(GradewatchError::Dispatch {
                    channel: self.name.clone(),
                    reason: "always fails".into(),
                })
            }
        }
    }

    struct SlowChannel;

    #[async_trait]
    impl NotificationChannel for SlowChannel {
        fn name(&self) -> &str {
            "slow"
        }
        async fn send(&self, _subject: &str, _content: &str) -> Result<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    struct PanickingChannel;

    #[async_trait]
    impl NotificationChannel for PanickingChannel {
        fn name(&self) -> &str {
            "panicky"
        }
        async fn send(&self, _subject: &str, _content: &str) -> Result<()> {
            panic!("channel blew up")
        }
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let mut d = NotificationDispatcher::new(Duration::from_secs(5));
        d.register(FixedChannel::new("a", true));
        d.register(FixedChannel::new("b", false));
        let results = d.dispatch("subject", "content").await;
        assert_eq!(results.get("a"), Some(&true));
        assert_eq!(results.get("b"), Some(&false));
    }

    #[tokio::test]
    async fn test_panicking_channel_recorded_as_failure() {
        let mut d = NotificationDispatcher::new(Duration::from_secs(5));
        d.register(FixedChannel::new("a", true));
        d.register(Arc::new(PanickingChannel));
        let results = d.dispatch("subject", "content").await;
        assert_eq!(results.get("a"), Some(&true));
        assert_eq!(results.get("panicky"), Some(&false));
    }

    #[tokio::test]
    async fn test_disabled_channel_skipped() {
        let ch = FixedChannel::new("a", true);
        let mut d = NotificationDispatcher::new(Duration::from_secs(5));
        d.register(ch.clone());
        d.set_enabled("a", false);
        let results = d.dispatch("s", "c").await;
        assert!(results.is_empty());
        assert_eq!(ch.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_recorded_as_failure() {
        let mut d = NotificationDispatcher::new(Duration::from_millis(50));
        d.register(Arc::new(SlowChannel));
        d.register(FixedChannel::new("fast", true));
        let results = d.dispatch("s", "c").await;
        assert_eq!(results.get("slow"), Some(&false));
        assert_eq!(results.get("fast"), Some(&true));
    }

    #[tokio::test]
    async fn test_reregistration_replaces() {
        let first = FixedChannel::new("a", false);
        let second = FixedChannel::new("a", true);
        let mut d = NotificationDispatcher::new(Duration::from_secs(5));
        d.register(first.clone());
        d.register(second);
        let results = d.dispatch("s", "c").await;
        assert_eq!(results.get("a"), Some(&true));
        assert_eq!(first.calls.load(Ordering::SeqCst), 0);
    }
}
