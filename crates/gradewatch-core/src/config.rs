//! Gradewatch configuration system.
//!
//! Loaded once at process start and passed down explicitly; components
//! never reach for globals. Credentials arrive here already validated —
//! encryption at rest is the installer's concern, not ours.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{GradewatchError, Result};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradewatchConfig {
    #[serde(default)]
    pub accounts: Vec<AccountConfig>,
    #[serde(default)]
    pub polling: PollingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
    #[serde(default)]
    pub plugins: PluginsConfig,
}

impl GradewatchConfig {
    /// Load config from the default path (~/.gradewatch/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| GradewatchError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| GradewatchError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Save config to the default path.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Save config to a specific path, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| GradewatchError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Gradewatch home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".gradewatch")
    }
}

/// One tracked student account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    pub school_code: String,
    pub username: String,
    pub password: String,
}

impl AccountConfig {
    /// Stable key for snapshot files and polling targets.
    pub fn account_key(&self) -> String {
        format!("{}:{}", self.school_code, self.username)
    }
}

/// Polling intervals per kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollingConfig {
    #[serde(default = "bool_true")]
    pub grades_enabled: bool,
    #[serde(default = "default_interval")]
    pub grades_interval_secs: u64,
    #[serde(default = "bool_true")]
    pub schedule_enabled: bool,
    #[serde(default = "default_interval")]
    pub schedule_interval_secs: u64,
    /// Each inter-cycle wait is shifted by up to ± this many seconds.
    #[serde(default = "default_jitter")]
    pub jitter_secs: u64,
    /// Ask adapters to bypass their upstream caches.
    #[serde(default)]
    pub force_update: bool,
}

fn default_interval() -> u64 {
    3600
}
fn default_jitter() -> u64 {
    30
}
fn bool_true() -> bool {
    true
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            grades_enabled: true,
            grades_interval_secs: default_interval(),
            schedule_enabled: true,
            schedule_interval_secs: default_interval(),
            jitter_secs: default_jitter(),
            force_update: false,
        }
    }
}

/// Fetch retry and backoff policy. The source tool never pinned these down,
/// so the defaults live here where operators can override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: u64,
    /// Upper bound on any single cycle phase; bounds shutdown latency.
    #[serde(default = "default_phase_timeout")]
    pub phase_timeout_secs: u64,
}

fn default_max_retries() -> u32 {
    3
}
fn default_backoff_base() -> u64 {
    5
}
fn default_backoff_cap() -> u64 {
    300
}
fn default_phase_timeout() -> u64 {
    120
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_base_secs: default_backoff_base(),
            backoff_cap_secs: default_backoff_cap(),
            phase_timeout_secs: default_phase_timeout(),
        }
    }
}

/// Dispatcher-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// A channel exceeding this is recorded as failed; others proceed.
    #[serde(default = "default_channel_timeout")]
    pub channel_timeout_secs: u64,
}

fn default_channel_timeout() -> u64 {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            channel_timeout_secs: default_channel_timeout(),
        }
    }
}

/// Per-channel transport configuration. Absent section = channel off.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub feishu: Option<FeishuConfig>,
    #[serde(default)]
    pub serverchan: Option<ServerChanConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

/// SMTP email channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub sender: String,
    pub receiver: String,
    /// SMTP password or app auth code.
    pub auth: String,
}

fn default_smtp_port() -> u16 {
    465
}

/// Feishu bot webhook configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeishuConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    pub webhook_url: String,
}

/// ServerChan push configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerChanConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    pub sendkey: String,
}

/// Generic HTTP webhook channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "bool_true")]
    pub enabled: bool,
    pub url: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
}

/// Plugin registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    #[serde(default = "default_index_url")]
    pub index_url: String,
    /// Prefix prepended to URLs when the direct fetch fails (GitHub proxy).
    #[serde(default = "default_mirror_prefix")]
    pub mirror_prefix: String,
    #[serde(default = "default_plugins_dir")]
    pub plugins_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_index_url() -> String {
    "https://github.com/gradewatch/adapters/releases/latest/download/plugins_index.json".into()
}
fn default_mirror_prefix() -> String {
    "https://ghfast.top/".into()
}
fn default_plugins_dir() -> PathBuf {
    GradewatchConfig::home_dir().join("plugins")
}
fn default_data_dir() -> PathBuf {
    GradewatchConfig::home_dir().join("data").join("downloads")
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            index_url: default_index_url(),
            mirror_prefix: default_mirror_prefix(),
            plugins_dir: default_plugins_dir(),
            data_dir: default_data_dir(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml_str = r#"
[[accounts]]
school_code = "10546"
username = "student1"
password = "secret"

[polling]
grades_interval_secs = 1800

[channels.feishu]
webhook_url = "https://open.feishu.cn/open-apis/bot/v2/hook/xxx"
"#;
        let cfg: GradewatchConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(cfg.accounts.len(), 1);
        assert_eq!(cfg.accounts[0].account_key(), "10546:student1");
        assert_eq!(cfg.polling.grades_interval_secs, 1800);
        // Untouched sections keep their defaults
        assert_eq!(cfg.polling.schedule_interval_secs, 3600);
        assert_eq!(cfg.retry.max_retries, 3);
        assert_eq!(cfg.dispatch.channel_timeout_secs, 10);
        assert!(cfg.channels.feishu.unwrap().enabled);
        assert!(cfg.channels.email.is_none());
    }

    #[test]
    fn test_defaults_round_trip() {
        let cfg = GradewatchConfig::default();
        let s = toml::to_string_pretty(&cfg).unwrap();
        let back: GradewatchConfig = toml::from_str(&s).unwrap();
        assert_eq!(back.retry.backoff_cap_secs, 300);
        assert!(back.accounts.is_empty());
    }
}
