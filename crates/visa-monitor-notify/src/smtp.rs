// crates/visa-monitor-notify/src/smtp.rs
// ============================================================================
// Module: SMTP Transport
// Description: Pooled async SMTP delivery backed by lettre.
// Purpose: Reuse relay connections across notifications.
// Dependencies: lettre, visa-monitor-config, visa-monitor-core
// ============================================================================

//! ## Overview
//! [`SmtpMailer`] wraps a pooled `AsyncSmtpTransport`. Port 465 uses
//! implicit TLS; every other port upgrades with STARTTLS. Idle pooled
//! connections are closed after the configured idle timeout.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use lettre::AsyncSmtpTransport;
use lettre::AsyncTransport;
use lettre::Message;
use lettre::Tokio1Executor;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use visa_monitor_config::SmtpConfig;
use visa_monitor_core::MailError;
use visa_monitor_core::MailTransport;
use visa_monitor_core::OutboundEmail;

use crate::dispatcher::NotifyError;

// ============================================================================
// SECTION: SMTP Mailer
// ============================================================================

/// Pooled SMTP transport.
pub struct SmtpMailer {
    /// Async relay transport with connection pool.
    transport: AsyncSmtpTransport<Tokio1Executor>,
    /// Sender mailbox.
    from: Mailbox,
}

impl SmtpMailer {
    /// Builds the transport from config.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] when the relay or sender is invalid.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config
            .from
            .trim()
            .parse()
            .map_err(|err| NotifyError::Config(format!("smtp.from: {err}")))?;
        let host = config.host.trim();
        let builder = if config.implicit_tls() {
            AsyncSmtpTransport::<Tokio1Executor>::relay(host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
        }
        .map_err(|err| NotifyError::Config(format!("smtp.host: {err}")))?;
        let pool = PoolConfig::new().idle_timeout(Duration::from_secs(config.pool_idle_secs));
        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)))
            .pool_config(pool);
        if let (Some(user), Some(pass)) = (&config.user, &config.pass) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }
        Ok(Self {
            transport: builder.build(),
            from,
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        let message = build_message(&self.from, email)?;
        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|err| MailError::Transport(err.to_string()))
    }
}

// ============================================================================
// SECTION: Unconfigured Transport
// ============================================================================

/// Transport used when no relay is configured; every send fails.
pub struct UnconfiguredTransport;

#[async_trait]
impl MailTransport for UnconfiguredTransport {
    async fn send(&self, _email: &OutboundEmail) -> Result<(), MailError> {
        Err(MailError::Build("smtp relay not configured".to_string()))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds an HTML message from `email`.
///
/// # Errors
///
/// Returns [`MailError::Build`] when the recipient or message is invalid.
pub fn build_message(from: &Mailbox, email: &OutboundEmail) -> Result<Message, MailError> {
    let to: Mailbox = email
        .to
        .trim()
        .parse()
        .map_err(|err| MailError::Build(format!("recipient {}: {err}", email.to)))?;
    Message::builder()
        .from(from.clone())
        .to(to)
        .subject(email.subject.as_str())
        .header(ContentType::TEXT_HTML)
        .body(email.html_body.clone())
        .map_err(|err| MailError::Build(err.to_string()))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, reason = "Test-only assertions.")]

    use super::*;

    #[test]
    fn build_message_rejects_bad_recipient() {
        let from: Mailbox = "monitor@example.com".parse().unwrap();
        let email = OutboundEmail {
            to: "not an address".to_string(),
            subject: "s".to_string(),
            html_body: "<p>b</p>".to_string(),
        };
        assert!(matches!(build_message(&from, &email), Err(MailError::Build(_))));
    }

    #[test]
    fn build_message_sets_html_body() {
        let from: Mailbox = "monitor@example.com".parse().unwrap();
        let email = OutboundEmail {
            to: "user@example.com".to_string(),
            subject: "[Granted / 已通过] PEKI202506020001 - CZ Visa Status 状态通知".to_string(),
            html_body: "<p>b</p>".to_string(),
        };
        let message = build_message(&from, &email).unwrap();
        let raw = String::from_utf8_lossy(&message.formatted()).into_owned();
        assert!(raw.contains("text/html"));
    }
}
