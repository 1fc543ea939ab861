// crates/visa-monitor-notify/src/lib.rs
// ============================================================================
// Module: Visa Monitor Notify Library
// Description: Email rendering and delivery for the monitor.
// Purpose: Turn tracker decisions into rate-limited, retried emails.
// Dependencies: visa-monitor-core, visa-monitor-config, lettre, tokio
// ============================================================================

//! ## Overview
//! The scheduler hands [`StatusNotification`] values to a [`Notifier`] and
//! moves on. Rendering, queueing, rate limiting, and SMTP retries happen on
//! a background worker. Self-service emails use the priority path.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod dispatcher;
pub mod limiter;
pub mod smtp;
pub mod templates;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use dispatcher::Notifier;
pub use dispatcher::NotifierSettings;
pub use dispatcher::NotifyError;
pub use dispatcher::StatusNotification;
pub use limiter::SlidingWindow;
pub use smtp::SmtpMailer;
pub use smtp::UnconfiguredTransport;
