//! Generic HTTP webhook channel — POSTs a JSON body to one URL.

use async_trait::async_trait;
use gradewatch_core::config::WebhookConfig;
use gradewatch_core::error::{GradewatchError, Result};
use gradewatch_core::traits::NotificationChannel;

pub struct WebhookChannel {
    config: WebhookConfig,
    client: reqwest::Client,
}

impl WebhookChannel {
    pub fn new(config: WebhookConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn payload(subject: &str, content: &str) -> serde_json::Value {
        serde_json::json!({
            "subject": subject,
            "content": content,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
    }
}

#[async_trait]
impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn send(&self, subject: &str, content: &str) -> Result<()> {
        let mut req = self
            .client
            .post(&self.config.url)
            .json(&Self::payload(subject, content));
        for (key, value) in &self.config.headers {
            req = req.header(key.as_str(), value.as_str());
        }
        let resp = req.send().await.map_err(|e| GradewatchError::Dispatch {
            channel: "webhook".into(),
            reason: format!("request: {e}"),
        })?;
        if resp.status().is_success() {
            tracing::info!("✅ Webhook delivered: {subject}");
            Ok(())
        } else {
            Err(GradewatchError::Dispatch {
                channel: "webhook".into(),
                reason: format!("http status {}", resp.status()),
            })
        }
    }
}
