// crates/visa-monitor-notify/src/dispatcher.rs
// ============================================================================
// Module: Notification Dispatcher
// Description: Rate-limited email queue with a priority bypass.
// Purpose: Deliver notifications without ever blocking a scheduling cycle.
// Dependencies: crate::{limiter, templates}, visa-monitor-core, tokio
// ============================================================================

//! ## Overview
//! Status notifications are rendered and pushed onto a bounded queue with a
//! non-blocking send. One worker drains the queue under a sliding-window
//! limit and retries transport failures with linear backoff. Verification
//! and management emails go through [`Notifier::send_priority`], which skips
//! both the queue and the limiter.
//!
//! ## Invariants
//! - [`Notifier::notify`] never waits on the transport or the limiter.
//! - Delivery failures are recorded as events and never surface to the
//!   scheduling cycle.
//! - [`Notifier::reconfigure`] swaps the transport and tuning for every
//!   handle at once; queued emails go out through the new transport.
//!   Queue capacity is fixed for the life of the worker.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio::time::sleep;
use visa_monitor_config::NotifyConfig;
use visa_monitor_core::MailError;
use visa_monitor_core::MailTransport;
use visa_monitor_core::MonitorEvent;
use visa_monitor_core::MonitorEventSink;
use visa_monitor_core::NotificationIntent;
use visa_monitor_core::OutboundEmail;
use visa_monitor_core::QueryCode;
use visa_monitor_core::Timestamp;
use visa_monitor_core::events::NOTIFICATION_FAILED;
use visa_monitor_core::events::NOTIFICATION_SENT;

use crate::limiter::SlidingWindow;
use crate::templates::StatusEmailParams;
use crate::templates::status_email;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Backoff step between transport retries.
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(2);

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Notification errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotifyError {
    /// Relay failed after every attempt.
    #[error("notification transport error: {0}")]
    Transport(String),
    /// Transport settings are unusable.
    #[error("notification config error: {0}")]
    Config(String),
    /// Worker has stopped.
    #[error("notification queue closed: {0}")]
    QueueClosed(String),
    /// Queue is at capacity.
    #[error("notification queue full: {0}")]
    QueueFull(String),
    /// Message could not be built.
    #[error("notification build error: {0}")]
    Build(String),
}

impl NotifyError {
    /// Returns a stable label for event fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Config(_) => "config",
            Self::QueueClosed(_) => "queue_closed",
            Self::QueueFull(_) => "queue_full",
            Self::Build(_) => "build",
        }
    }
}

// ============================================================================
// SECTION: Types
// ============================================================================

/// Dispatcher tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierSettings {
    /// Ordinary emails per sliding minute.
    pub max_per_minute: u32,
    /// Delay applied to first-status emails.
    pub first_check_delay: Duration,
    /// Transport attempts per email.
    pub max_send_attempts: u32,
    /// Backoff step between attempts.
    pub retry_backoff: Duration,
    /// Ordinary queue capacity.
    pub queue_capacity: usize,
    /// Public status page link included in status emails.
    pub public_base_url: Option<String>,
}

impl NotifierSettings {
    /// Builds settings from the notify config section.
    #[must_use]
    pub fn from_config(config: &NotifyConfig, public_base_url: Option<String>) -> Self {
        Self {
            max_per_minute: config.email_max_per_minute,
            first_check_delay: Duration::from_secs(config.email_first_check_delay_secs),
            max_send_attempts: config.max_send_attempts,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            queue_capacity: config.queue_capacity,
            public_base_url,
        }
    }
}

impl Default for NotifierSettings {
    fn default() -> Self {
        Self {
            max_per_minute: 10,
            first_check_delay: Duration::from_secs(30),
            max_send_attempts: 3,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            queue_capacity: 1024,
            public_base_url: None,
        }
    }
}

/// Status notification request produced by a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusNotification {
    /// Applicant code.
    pub code: QueryCode,
    /// Recipient address.
    pub target: String,
    /// What changed.
    pub intent: NotificationIntent,
    /// Time of the reading.
    pub checked_at: Timestamp,
}

/// Email waiting in the ordinary queue.
#[derive(Debug, Clone)]
struct QueuedEmail {
    /// Rendered message.
    email: OutboundEmail,
    /// Code the message is about.
    code: QueryCode,
}

/// Transport and tuning in effect.
#[derive(Clone)]
struct Delivery {
    /// Mail relay.
    transport: Arc<dyn MailTransport>,
    /// Tuning.
    settings: NotifierSettings,
}

/// State shared by the handle and the worker.
struct NotifierShared {
    /// Current delivery settings.
    delivery: RwLock<Delivery>,
    /// Event sink.
    events: Arc<dyn MonitorEventSink>,
}

impl NotifierShared {
    /// Returns a copy of the delivery settings in effect.
    fn delivery(&self) -> Delivery {
        self.delivery.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Cloneable notification handle.
#[derive(Clone)]
pub struct Notifier {
    /// Shared state.
    shared: Arc<NotifierShared>,
    /// Ordinary queue sender.
    sender: mpsc::Sender<QueuedEmail>,
}

impl Notifier {
    /// Starts the queue worker and returns the handle plus the worker task.
    ///
    /// The worker exits once every handle is dropped and the queue drains.
    #[must_use]
    pub fn spawn(
        transport: Arc<dyn MailTransport>,
        settings: NotifierSettings,
        events: Arc<dyn MonitorEventSink>,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(settings.queue_capacity.max(1));
        let shared = Arc::new(NotifierShared {
            delivery: RwLock::new(Delivery {
                transport,
                settings,
            }),
            events,
        });
        let worker = tokio::spawn(run_worker(receiver, Arc::clone(&shared)));
        (
            Self {
                shared,
                sender,
            },
            worker,
        )
    }

    /// Renders and enqueues a status notification.
    ///
    /// First-status emails are held for the configured delay before they
    /// join the queue.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::QueueFull`] or [`NotifyError::QueueClosed`]
    /// when the email cannot be queued.
    pub fn notify(&self, notification: &StatusNotification) -> Result<(), NotifyError> {
        let settings = self.shared.delivery().settings;
        let email = status_email(
            &notification.target,
            &StatusEmailParams {
                code: &notification.code,
                intent: &notification.intent,
                checked_at: notification.checked_at,
                public_base_url: settings.public_base_url.as_deref(),
            },
        );
        let queued = QueuedEmail {
            email,
            code: notification.code.clone(),
        };
        let delay = settings.first_check_delay;
        if notification.intent.is_first() && !delay.is_zero() {
            let sender = self.sender.clone();
            let shared = Arc::clone(&self.shared);
            tokio::spawn(async move {
                sleep(delay).await;
                if sender.send(queued.clone()).await.is_err() {
                    record_failure(&shared, &queued.email, Some(&queued.code), 0, "queue closed");
                }
            });
            return Ok(());
        }
        self.sender.try_send(queued).map_err(|err| match err {
            TrySendError::Full(queued) => {
                record_failure(&self.shared, &queued.email, Some(&queued.code), 0, "queue full");
                NotifyError::QueueFull(queued.code.to_string())
            }
            TrySendError::Closed(queued) => {
                record_failure(&self.shared, &queued.email, Some(&queued.code), 0, "queue closed");
                NotifyError::QueueClosed(queued.code.to_string())
            }
        })
    }

    /// Sends immediately, bypassing the queue and the rate limit.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError`] when every attempt fails.
    pub async fn send_priority(&self, email: &OutboundEmail) -> Result<(), NotifyError> {
        deliver(&self.shared, email, None).await
    }

    /// Replaces the transport and tuning used by every handle and the worker.
    ///
    /// `settings.queue_capacity` is ignored; the queue keeps its original size.
    pub fn reconfigure(&self, transport: Arc<dyn MailTransport>, settings: NotifierSettings) {
        let mut delivery = self.shared.delivery.write().unwrap_or_else(PoisonError::into_inner);
        *delivery = Delivery {
            transport,
            settings,
        };
    }

    /// Returns the tuning currently in effect.
    #[must_use]
    pub fn settings(&self) -> NotifierSettings {
        self.shared.delivery().settings
    }
}

// ============================================================================
// SECTION: Worker
// ============================================================================

/// Drains the ordinary queue under the sliding-window limit.
async fn run_worker(mut receiver: mpsc::Receiver<QueuedEmail>, shared: Arc<NotifierShared>) {
    let mut limit = shared.delivery().settings.max_per_minute;
    let mut limiter = SlidingWindow::per_minute(limit);
    while let Some(queued) = receiver.recv().await {
        loop {
            let current = shared.delivery().settings.max_per_minute;
            if current != limit {
                limit = current;
                limiter.set_limit(limit);
            }
            match limiter.try_acquire(Instant::now().into_std()) {
                Ok(()) => break,
                Err(wait) => sleep(wait).await,
            }
        }
        let _ = deliver(&shared, &queued.email, Some(&queued.code)).await;
    }
}

/// Sends one email with retries and records the outcome.
async fn deliver(
    shared: &NotifierShared,
    email: &OutboundEmail,
    code: Option<&QueryCode>,
) -> Result<(), NotifyError> {
    let Delivery {
        transport,
        settings,
    } = shared.delivery();
    let attempts = settings.max_send_attempts.max(1);
    let mut last_error = String::new();
    for attempt in 1 ..= attempts {
        match transport.send(email).await {
            Ok(()) => {
                let mut event = MonitorEvent::new(NOTIFICATION_SENT)
                    .with("to", email.to.as_str())
                    .with("subject", email.subject.as_str())
                    .with("attempts", attempt);
                if let Some(code) = code {
                    event = event.with("code", code.as_str());
                }
                shared.events.record(&event);
                return Ok(());
            }
            Err(MailError::Build(message)) => {
                record_failure(shared, email, code, attempt, &message);
                return Err(NotifyError::Build(message));
            }
            Err(MailError::Transport(message)) => {
                last_error = message;
                if attempt < attempts {
                    sleep(settings.retry_backoff.saturating_mul(attempt)).await;
                }
            }
        }
    }
    record_failure(shared, email, code, attempts, &last_error);
    Err(NotifyError::Transport(last_error))
}

/// Records a `notification_failed` event.
fn record_failure(
    shared: &NotifierShared,
    email: &OutboundEmail,
    code: Option<&QueryCode>,
    attempts: u32,
    error: &str,
) {
    let mut event = MonitorEvent::new(NOTIFICATION_FAILED)
        .with("to", email.to.as_str())
        .with("attempts", attempts)
        .with("error", error);
    if let Some(code) = code {
        event = event.with("code", code.as_str());
    }
    shared.events.record(&event);
}
