//! Wires config into running components: registry, channels, store, and
//! one polling loop per (account, kind).
//!
//! Everything is built from the loaded config and passed down explicitly.
//! A component that cannot be built (unknown school code, bad channel
//! config) is logged and skipped so one broken account never takes the
//! daemon down with it.

use std::sync::Arc;

use gradewatch_channels::{
    EmailChannel, FeishuChannel, NotificationDispatcher, ServerChanChannel, WebhookChannel,
};
use gradewatch_core::config::GradewatchConfig;
use gradewatch_core::error::Result;
use gradewatch_core::types::SnapshotKind;
use gradewatch_plugins::PluginRegistry;
use gradewatch_scheduler::{
    PhaseReporter, PollCycle, PollingScheduler, SchedulerSettings, TargetId,
};
use gradewatch_state::StateStore;

use crate::cycle::AccountCycle;

pub struct Orchestrator {
    config: GradewatchConfig,
    registry: Arc<PluginRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    store: Arc<StateStore>,
    scheduler: PollingScheduler,
}

impl Orchestrator {
    pub fn new(config: GradewatchConfig) -> Result<Self> {
        let mut registry = PluginRegistry::new(&config.plugins)?;
        for adapter in gradewatch_plugins::builtin_adapters() {
            registry.register_builtin(adapter);
        }
        let registry = Arc::new(registry);
        let dispatcher = Arc::new(build_dispatcher(&config));
        let store = Arc::new(StateStore::new(&StateStore::default_path())?);
        Ok(Self {
            config,
            registry,
            dispatcher,
            store,
            scheduler: PollingScheduler::new(),
        })
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    /// Every enabled (account, kind) pair.
    fn targets(&self) -> Vec<(usize, SnapshotKind)> {
        let mut targets = Vec::new();
        for (i, _) in self.config.accounts.iter().enumerate() {
            if self.config.polling.grades_enabled {
                targets.push((i, SnapshotKind::Grades));
            }
            if self.config.polling.schedule_enabled {
                targets.push((i, SnapshotKind::Schedule));
            }
        }
        targets
    }

    /// Resolve adapters and build the cycle for each target. Failures are
    /// logged and the target skipped.
    async fn build_cycles(&self) -> Vec<Arc<dyn PollCycle>> {
        let mut cycles: Vec<Arc<dyn PollCycle>> = Vec::new();
        for (i, kind) in self.targets() {
            let account = &self.config.accounts[i];
            let adapter = match self.registry.resolve(&account.school_code).await {
                Ok(adapter) => adapter,
                Err(e) => {
                    tracing::error!(
                        "❌ No adapter for school {} (account {}): {e}",
                        account.school_code,
                        account.username
                    );
                    continue;
                }
            };
            cycles.push(Arc::new(AccountCycle::new(
                TargetId::new(&account.account_key(), kind),
                adapter,
                &account.username,
                &account.password,
                Arc::clone(&self.store),
                Arc::clone(&self.dispatcher),
            )));
        }
        cycles
    }

    /// Run the daemon: one polling loop per target until ctrl-c.
    pub async fn run(&self) -> Result<()> {
        if self.config.accounts.is_empty() {
            tracing::warn!("⚠️ No accounts configured; nothing to poll");
            return Ok(());
        }
        if self.dispatcher.is_empty() {
            tracing::warn!("⚠️ No notification channels configured; changes will only be logged");
        }

        let cycles = self.build_cycles().await;
        if cycles.is_empty() {
            tracing::warn!("⚠️ No usable polling targets");
            return Ok(());
        }

        for cycle in cycles {
            let settings = SchedulerSettings::from_config(
                &self.config.polling,
                &self.config.retry,
                cycle.target().kind,
            );
            self.scheduler.start(cycle, settings).await;
        }
        tracing::info!(
            "🚀 Gradewatch running: {} targets, channels: {:?}",
            self.scheduler.target_count().await,
            self.dispatcher.channel_names()
        );

        tokio::signal::ctrl_c().await?;
        tracing::info!("Received ctrl-c, shutting down");
        self.scheduler.shutdown().await;
        Ok(())
    }

    /// Run exactly one cycle per target, sequentially, then exit.
    /// Returns the number of targets whose cycle failed.
    pub async fn run_once(&self, force_update: bool) -> Result<usize> {
        let force = force_update || self.config.polling.force_update;
        let mut failures = 0usize;
        for cycle in self.build_cycles().await {
            let target = cycle.target();
            match cycle.fetch(force).await {
                Ok(records) => match cycle
                    .process(records, &PhaseReporter::detached())
                    .await
                {
                    Ok(report) => {
                        tracing::info!(
                            "✅ {target}: {} changes, {} delivered",
                            report.events,
                            report.delivered
                        );
                    }
                    Err(e) => {
                        tracing::error!("❌ {target}: processing failed: {e}");
                        failures += 1;
                    }
                },
                Err(e) => {
                    tracing::error!("❌ {target}: fetch failed: {e}");
                    failures += 1;
                }
            }
        }
        Ok(failures)
    }
}

/// Build the dispatcher from the channel config sections. Absent section
/// means channel off; present-but-disabled is registered off so it can be
/// toggled without a restart.
pub fn build_dispatcher(config: &GradewatchConfig) -> NotificationDispatcher {
    let timeout = std::time::Duration::from_secs(config.dispatch.channel_timeout_secs);
    let mut dispatcher = NotificationDispatcher::new(timeout);

    if let Some(email) = &config.channels.email {
        let enabled = email.enabled;
        dispatcher.register(Arc::new(EmailChannel::new(email.clone())));
        dispatcher.set_enabled("email", enabled);
    }
    if let Some(feishu) = &config.channels.feishu {
        let enabled = feishu.enabled;
        dispatcher.register(Arc::new(FeishuChannel::new(feishu.clone())));
        dispatcher.set_enabled("feishu", enabled);
    }
    if let Some(serverchan) = &config.channels.serverchan {
        let enabled = serverchan.enabled;
        dispatcher.register(Arc::new(ServerChanChannel::new(serverchan.clone())));
        dispatcher.set_enabled("serverchan", enabled);
    }
    if let Some(webhook) = &config.channels.webhook {
        let enabled = webhook.enabled;
        dispatcher.register(Arc::new(WebhookChannel::new(webhook.clone())));
        dispatcher.set_enabled("webhook", enabled);
    }
    dispatcher
}

#[cfg(test)]
mod tests {
    use super::*;
    use gradewatch_core::config::{ChannelsConfig, FeishuConfig, ServerChanConfig};

    #[test]
    fn test_dispatcher_built_from_configured_sections() {
        let config = GradewatchConfig {
            channels: ChannelsConfig {
                feishu: Some(FeishuConfig {
                    enabled: true,
                    webhook_url: "https://open.feishu.cn/open-apis/bot/v2/hook/x".into(),
                }),
                serverchan: Some(ServerChanConfig {
                    enabled: false,
                    sendkey: "SCT000".into(),
                }),
                ..Default::default()
            },
            ..Default::default()
        };
        let dispatcher = build_dispatcher(&config);
        assert_eq!(dispatcher.channel_names(), vec!["feishu", "serverchan"]);
    }

    #[test]
    fn test_empty_config_builds_empty_dispatcher() {
        let dispatcher = build_dispatcher(&GradewatchConfig::default());
        assert!(dispatcher.is_empty());
    }
}
