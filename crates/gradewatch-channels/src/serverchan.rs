//! ServerChan channel — WeChat push via sctapi.ftqq.com sendkey.

use async_trait::async_trait;
use gradewatch_core::config::ServerChanConfig;
use gradewatch_core::error::{GradewatchError, Result};
use gradewatch_core::traits::NotificationChannel;

pub struct ServerChanChannel {
    config: ServerChanConfig,
    client: reqwest::Client,
}

impl ServerChanChannel {
    pub fn new(config: ServerChanConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn endpoint(sendkey: &str) -> String {
        format!("https://sctapi.ftqq.com/{sendkey}.send")
    }
}

#[async_trait]
impl NotificationChannel for ServerChanChannel {
    fn name(&self) -> &str {
        "serverchan"
    }

    async fn send(&self, subject: &str, content: &str) -> Result<()> {
        if self.config.sendkey.is_empty() {
            return Err(GradewatchError::Dispatch {
                channel: "serverchan".into(),
                reason: "sendkey is empty".into(),
            });
        }
        let resp = self
            .client
            .post(Self::endpoint(&self.config.sendkey))
            .form(&[("title", subject), ("desp", content)])
            .send()
            .await
            .map_err(|e| GradewatchError::Dispatch {
                channel: "serverchan".into(),
                reason: format!("request: {e}"),
            })?;

        let body: serde_json::Value =
            resp.json().await.map_err(|e| GradewatchError::Dispatch {
                channel: "serverchan".into(),
                reason: format!("response: {e}"),
            })?;
        if body["code"].as_i64() == Some(0) {
            tracing::info!("✅ ServerChan message sent: {subject}");
            Ok(())
        } else {
            Err(GradewatchError::Dispatch {
                channel: "serverchan".into(),
                reason: format!(
                    "api error: {}",
                    body["message"].as_str().unwrap_or("unknown")
                ),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_embeds_sendkey() {
        assert_eq!(
            ServerChanChannel::endpoint("SCT123KEY"),
            "https://sctapi.ftqq.com/SCT123KEY.send"
        );
    }

    #[tokio::test]
    async fn test_empty_sendkey_fails_fast() {
        let ch = ServerChanChannel::new(ServerChanConfig {
            enabled: true,
            sendkey: String::new(),
        });
        assert!(ch.send("s", "c").await.is_err());
    }
}
