//! SMTP delivery via lettre.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, warn};

use crate::config::parse_var;
use crate::error::{ConfigError, NotifyError};
use crate::jobs::model::display_name;
use crate::notify::{Notification, Notifier};

// ── Configuration ───────────────────────────────────────────────────

/// SMTP notifier configuration, built from environment variables.
#[derive(Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Append a "Time: ..." line to every body.
    pub include_timestamp: bool,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `SMTP_HOST` is not set (notifications disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(host) = var("SMTP_HOST").filter(|h| !h.trim().is_empty()) else {
            return Ok(None);
        };

        let port: u16 = parse_var("SMTP_PORT", var("SMTP_PORT"))?.unwrap_or(587);
        let include_timestamp: bool =
            parse_var("SMTP_INCLUDE_TIMESTAMP", var("SMTP_INCLUDE_TIMESTAMP"))?.unwrap_or(false);

        let username = var("SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(var("SMTP_PASSWORD").unwrap_or_default());
        let from_address = var("SMTP_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        Ok(Some(Self {
            host,
            port,
            username,
            password,
            from_address,
            include_timestamp,
        }))
    }
}

// ── Notifier ────────────────────────────────────────────────────────

/// Sends completion notices with the produced artifacts attached.
pub struct SmtpNotifier {
    config: Arc<SmtpConfig>,
}

impl SmtpNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Build the message without sending it. Reads attachments from disk.
    pub fn build_message(&self, notification: &Notification) -> Result<Message, NotifyError> {
        build_message(&self.config, notification)
    }
}

fn build_message(config: &SmtpConfig, notification: &Notification) -> Result<Message, NotifyError> {
    let from: Mailbox = parse_mailbox(&config.from_address)?;
    let to: Mailbox = parse_mailbox(&notification.to)?;

    let mut parts = MultiPart::mixed().singlepart(
        SinglePart::builder()
            .header(ContentType::TEXT_PLAIN)
            .body(notification.body(config.include_timestamp)),
    );

    for artifact in &notification.artifacts {
        match attachment(artifact) {
            Ok(part) => parts = parts.singlepart(part),
            // Missing outputs are tolerated upstream, so skip rather than fail.
            Err(e) => warn!(error = %e, "Skipping attachment"),
        }
    }

    Message::builder()
        .from(from)
        .to(to)
        .subject(notification.subject())
        .multipart(parts)
        .map_err(|e| NotifyError::Build(e.to_string()))
}

/// Send an email via SMTP. Blocking.
fn send_blocking(config: &SmtpConfig, email: &Message) -> Result<(), NotifyError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::starttls_relay(&config.host)
        .map_err(|e| NotifyError::Transport(format!("SMTP relay error: {e}")))?
        .port(config.port)
        .credentials(creds)
        .build();

    transport
        .send(email)
        .map_err(|e| NotifyError::Transport(format!("SMTP send failed: {e}")))?;
    Ok(())
}

#[async_trait]
impl Notifier for SmtpNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let config = Arc::clone(&self.config);
        let owned = notification.clone();

        tokio::task::spawn_blocking(move || {
            let email = build_message(&config, &owned)?;
            send_blocking(&config, &email)
        })
        .await
        .map_err(|e| NotifyError::Transport(format!("SMTP task failed: {e}")))??;

        info!(to = %notification.to, original = %notification.original_name, "Completion email sent");
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, NotifyError> {
    address.parse().map_err(|e| NotifyError::Address {
        address: address.to_string(),
        reason: format!("{e}"),
    })
}

fn attachment(path: &Path) -> Result<SinglePart, NotifyError> {
    let bytes = std::fs::read(path).map_err(|e| NotifyError::Attachment {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let content_type = ContentType::parse("application/octet-stream").map_err(|e| {
        NotifyError::Attachment {
            path: path.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    Ok(Attachment::new(display_name(path)).body(bytes, content_type))
}
