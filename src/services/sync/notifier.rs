use crate::core::config::RelayConfig;
use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

/// Operator-visible alert channel for quarantine events. Fire-and-forget:
/// the pipeline logs a failed notification and keeps going.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, subject: &str, body: &str) -> Result<()>;
}

/// Sends alerts as plain-text mail over SMTP.
pub struct SmtpNotifier {
    smtp_server: String,
    smtp_port: u16,
    username: String,
    password: String,
    to: String,
}

impl SmtpNotifier {
    pub fn new(config: &RelayConfig) -> Self {
        Self {
            smtp_server: config.smtp_server.clone(),
            smtp_port: config.smtp_port,
            username: config.username.clone(),
            password: config.password.clone(),
            to: config.notify_to.clone(),
        }
    }
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, subject: &str, body: &str) -> Result<()> {
        info!("Sending notification to {}: {}", self.to, subject);

        let email = Message::builder()
            .from(self.username.parse()?)
            .to(self.to.parse()?)
            .subject(subject)
            .body(body.to_string())?;

        let creds = Credentials::new(self.username.clone(), self.password.clone());
        let mailer = SmtpTransport::builder_dangerous(&self.smtp_server)
            .port(self.smtp_port)
            .credentials(creds)
            .build();

        mailer.send(&email).context("Failed to send notification")?;

        info!("Notification sent to {}", self.to);
        Ok(())
    }
}
