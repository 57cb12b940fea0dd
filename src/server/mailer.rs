//! Recovery email delivery.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::info;
use serde::Serialize;

use crate::config::MailConfig;
use crate::constants::RECOVERY_EMAIL_SUBJECT;

#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Environment variable {0} with the mail API key is not set")]
    MissingApiKey(String),

    #[error("Mail request failed: {0}")]
    Request(String),

    #[error("Mail API answered with status {0}")]
    Status(u16),
}

/// A recovery email: the token plus a link that restores it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryMessage {
    pub to: String,
    pub token: String,
    pub restore_url: String,
}

impl RecoveryMessage {
    pub fn new(to: &str, token: &str, app_url: &str) -> Self {
        Self {
            to: to.to_string(),
            token: token.to_string(),
            restore_url: format!("{}?token={token}", app_url.trim_end_matches('/')),
        }
    }

    pub fn subject(&self) -> &'static str {
        RECOVERY_EMAIL_SUBJECT
    }

    pub fn body(&self) -> String {
        format!(
            "Your recovery code is {}\n\n\
             Open {} on a new device to restore your tasks, or enter the code manually.\n\n\
             Accounts that do not sync for a while are deleted, so sync from time to time to keep it.\n",
            self.token, self.restore_url
        )
    }
}

/// Sends recovery messages.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_recovery(&self, message: &RecoveryMessage) -> Result<(), MailError>;

    /// Short name shown by the detailed health check.
    fn provider(&self) -> &'static str;
}

/// Mailer that only logs messages. Used when mail is disabled.
#[derive(Debug, Default)]
pub struct LogMailer {
    sent: Mutex<Vec<RecoveryMessage>>,
}

impl LogMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages handed to this mailer so far.
    pub fn sent(&self) -> Vec<RecoveryMessage> {
        self.sent.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

#[async_trait]
impl Mailer for LogMailer {
    async fn send_recovery(&self, message: &RecoveryMessage) -> Result<(), MailError> {
        info!("📧 Recovery email for {} (mail disabled): {}", message.to, message.restore_url);
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(message.clone());
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "log"
    }
}

#[derive(Serialize)]
struct OutgoingMail<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Mailer posting JSON to an HTTP mail API with a bearer key.
#[derive(Debug, Clone)]
pub struct HttpMailer {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    from: String,
}

impl HttpMailer {
    pub fn from_config(config: &MailConfig, timeout: Duration) -> Result<Self, MailError> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| MailError::MissingApiKey(config.api_key_env.clone()))?;
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MailError::Request(e.to_string()))?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key,
            from: config.from.clone(),
        })
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_recovery(&self, message: &RecoveryMessage) -> Result<(), MailError> {
        let mail = OutgoingMail {
            from: &self.from,
            to: &message.to,
            subject: message.subject(),
            text: message.body(),
        };
        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&mail)
            .send()
            .await
            .map_err(|e| MailError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(MailError::Status(response.status().as_u16()));
        }
        info!("📧 Sent recovery email to {}", message.to);
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "http"
    }
}

/// Build the mailer selected by the configuration.
pub fn from_config(config: &MailConfig) -> Result<Arc<dyn Mailer>, MailError> {
    if config.enabled {
        Ok(Arc::new(HttpMailer::from_config(config, Duration::from_secs(10))?))
    } else {
        Ok(Arc::new(LogMailer::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_link_contains_token() {
        let message = RecoveryMessage::new("a@example.com", "ABC-DEF-GHJ", "https://tasks.example.com/");
        assert_eq!(message.restore_url, "https://tasks.example.com?token=ABC-DEF-GHJ");
        assert!(message.body().contains("ABC-DEF-GHJ"));
    }

    #[tokio::test]
    async fn test_log_mailer_records_messages() {
        let mailer = LogMailer::new();
        let message = RecoveryMessage::new("a@example.com", "ABC-DEF-GHJ", "http://localhost");
        mailer.send_recovery(&message).await.unwrap();
        assert_eq!(mailer.sent(), vec![message]);
    }
}
