//! Feishu bot channel — pushes via an incoming-webhook robot.
//!
//! Subject and content are merged into one text message; Feishu reports
//! success with `code == 0` in the response body.

use async_trait::async_trait;
use gradewatch_core::config::FeishuConfig;
use gradewatch_core::error::{GradewatchError, Result};
use gradewatch_core::traits::NotificationChannel;

pub struct FeishuChannel {
    config: FeishuConfig,
    client: reqwest::Client,
}

impl FeishuChannel {
    pub fn new(config: FeishuConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Text-message payload for the bot webhook.
    pub fn payload(subject: &str, content: &str) -> serde_json::Value {
        serde_json::json!({
            "msg_type": "text",
            "content": { "text": format!("{subject}\n\n{content}") }
        })
    }
}

#[async_trait]
impl NotificationChannel for FeishuChannel {
    fn name(&self) -> &str {
        "feishu"
    }

    async fn send(&self, subject: &str, content: &str) -> Result<()> {
        if self.config.webhook_url.is_empty() {
            return Err(GradewatchError::Dispatch {
                channel: "feishu".into(),
                reason: "webhook_url is empty".into(),
            });
        }
        let resp = self
            .client
            .post(&self.config.webhook_url)
            .json(&Self::payload(subject, content))
            .send()
            .await
            .map_err(|e| GradewatchError::Dispatch {
                channel: "feishu".into(),
                reason: format!("request: {e}"),
            })?;

        let body: serde_json::Value =
            resp.json().await.map_err(|e| GradewatchError::Dispatch {
                channel: "feishu".into(),
                reason: format!("response: {e}"),
            })?;
        if body["code"].as_i64() == Some(0) {
            tracing::info!("✅ Feishu message sent: {subject}");
            Ok(())
        } else {
            Err(GradewatchError::Dispatch {
                channel: "feishu".into(),
                reason: format!("api error: {}", body["msg"].as_str().unwrap_or("unknown")),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_merges_subject_and_content() {
        let p = FeishuChannel::payload("成绩变动通知", "Math: 90 → 95");
        assert_eq!(p["msg_type"], "text");
        let text = p["content"]["text"].as_str().unwrap();
        assert!(text.starts_with("成绩变动通知"));
        assert!(text.contains("90 → 95"));
    }

    #[tokio::test]
    async fn test_empty_webhook_url_fails_fast() {
        let ch = FeishuChannel::new(FeishuConfig {
            enabled: true,
            webhook_url: String::new(),
        });
        assert!(ch.send("s", "c").await.is_err());
    }
}
