//! Outbound notifications. One real transport (an HTTP mail endpoint) and a
//! logging fallback for deployments without one configured.

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<()>;
}

/// Posts mail through a JSON HTTP endpoint.
pub struct MailNotifier {
    client: reqwest::Client,
    endpoint: String,
    from: String,
}

impl MailNotifier {
    #[must_use]
    pub const fn new(client: reqwest::Client, endpoint: String, from: String) -> Self {
        Self {
            client,
            endpoint,
            from,
        }
    }
}

#[async_trait]
impl Notifier for MailNotifier {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<()> {
        let body = format!(
            "A password reset was requested for your account.\n\n\
             Use this link within one hour: {reset_link}\n\n\
             If you did not request this, you can ignore this message."
        );

        self.client
            .post(&self.endpoint)
            .json(&serde_json::json!({
                "from": self.from,
                "to": to,
                "subject": "Password reset",
                "body": body,
            }))
            .send()
            .await
            .context("Mail endpoint unreachable")?
            .error_for_status()
            .context("Mail endpoint rejected message")?;

        Ok(())
    }
}

/// Fallback used when no mail endpoint is configured. The link still has to
/// reach an operator somehow, so it goes to the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_password_reset(&self, to: &str, reset_link: &str) -> Result<()> {
        info!("No mail endpoint configured; reset link for {to}: {reset_link}");
        Ok(())
    }
}
