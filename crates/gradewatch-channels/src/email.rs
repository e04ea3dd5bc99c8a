//! Email channel — async SMTP sending via lettre.
//!
//! Fixed sender/receiver pair from config; the auth field is the SMTP
//! password or app auth code most campus mail providers hand out.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use gradewatch_core::config::EmailConfig;
use gradewatch_core::error::{GradewatchError, Result};
use gradewatch_core::traits::NotificationChannel;

pub struct EmailChannel {
    config: EmailConfig,
}

impl EmailChannel {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn dispatch_err(reason: String) -> GradewatchError {
        GradewatchError::Dispatch {
            channel: "email".into(),
            reason,
        }
    }

    /// Build the outgoing message. Separate from `send` so address and
    /// header handling is testable without a live SMTP server.
    pub fn build_message(&self, subject: &str, content: &str) -> Result<Message> {
        Message::builder()
            .from(
                self.config
                    .sender
                    .parse()
                    .map_err(|e| Self::dispatch_err(format!("sender address: {e}")))?,
            )
            .to(self
                .config
                .receiver
                .parse()
                .map_err(|e| Self::dispatch_err(format!("receiver address: {e}")))?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(content.to_string())
            .map_err(|e| Self::dispatch_err(format!("build message: {e}")))
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, subject: &str, content: &str) -> Result<()> {
        let message = self.build_message(subject, content)?;

        let creds = Credentials::new(self.config.sender.clone(), self.config.auth.clone());
        let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&self.config.smtp_host)
            .map_err(|e| Self::dispatch_err(format!("smtp relay: {e}")))?
            .port(self.config.smtp_port)
            .credentials(creds)
            .build();

        mailer
            .send(message)
            .await
            .map_err(|e| Self::dispatch_err(format!("smtp send: {e}")))?;
        tracing::info!("✅ Email sent: {subject}");
        Ok(())
    }
}
