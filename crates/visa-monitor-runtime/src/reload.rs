// crates/visa-monitor-runtime/src/reload.rs
// ============================================================================
// Module: Reload Targets
// Description: Long-lived components that adopt settings from a new config.
// Purpose: Carry transport, rate-limit, and portal changes across a reload.
// Dependencies: visa-monitor-{config,notify}, crate::portal
// ============================================================================

//! ## Overview
//! A reload swaps the scheduler's [`ConfigSnapshot`](visa_monitor_config::ConfigSnapshot),
//! but the mail relay and the portal client are built once at startup. Each
//! of them implements [`Reconfigure`]. The monitor stages every target
//! against the incoming config and applies the staged changes only after all
//! targets accepted it.
//!
//! ## Invariants
//! - Staging has no side effects.
//! - A target whose settings did not change stages nothing.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use visa_monitor_config::MonitorConfig;
use visa_monitor_config::NotifyConfig;
use visa_monitor_core::MailTransport;
use visa_monitor_notify::Notifier;
use visa_monitor_notify::NotifierSettings;
use visa_monitor_notify::SmtpMailer;
use visa_monitor_notify::UnconfiguredTransport;

use crate::error::RuntimeError;
use crate::portal::PortalExecutor;
use crate::portal::PortalSettings;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Change prepared by [`Reconfigure::stage`], run when the reload commits.
pub type StagedChange = Box<dyn FnOnce() + Send>;

/// Component that picks up new settings on reload.
pub trait Reconfigure: Send + Sync {
    /// Name used in reload events.
    fn name(&self) -> &'static str;

    /// Prepares the move from `previous` to `next`.
    ///
    /// Returns `None` when nothing this component owns changed.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Config`] when `next` cannot be applied.
    fn stage(
        &self,
        previous: &MonitorConfig,
        next: &MonitorConfig,
    ) -> Result<Option<StagedChange>, RuntimeError>;
}

// ============================================================================
// SECTION: Targets
// ============================================================================

impl Reconfigure for Notifier {
    fn name(&self) -> &'static str {
        "notifier"
    }

    fn stage(
        &self,
        previous: &MonitorConfig,
        next: &MonitorConfig,
    ) -> Result<Option<StagedChange>, RuntimeError> {
        if previous.notify == next.notify
            && previous.server.public_base_url == next.server.public_base_url
        {
            return Ok(None);
        }
        let transport = mail_transport(&next.notify)?;
        let settings =
            NotifierSettings::from_config(&next.notify, next.server.public_base_url.clone());
        let notifier = self.clone();
        Ok(Some(Box::new(move || notifier.reconfigure(transport, settings))))
    }
}

impl Reconfigure for PortalExecutor {
    fn name(&self) -> &'static str {
        "portal"
    }

    fn stage(
        &self,
        previous: &MonitorConfig,
        next: &MonitorConfig,
    ) -> Result<Option<StagedChange>, RuntimeError> {
        if previous.portal == next.portal {
            return Ok(None);
        }
        let settings = PortalSettings::from_config(&next.portal)?;
        let executor = self.clone();
        Ok(Some(Box::new(move || executor.update(settings))))
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Builds the mail relay for `config`.
///
/// Without SMTP settings every message fails through
/// [`UnconfiguredTransport`].
///
/// # Errors
///
/// Returns [`RuntimeError::Config`] when the SMTP settings are unusable.
pub fn mail_transport(config: &NotifyConfig) -> Result<Arc<dyn MailTransport>, RuntimeError> {
    match &config.smtp {
        Some(smtp) => {
            let mailer = SmtpMailer::from_config(smtp)
                .map_err(|err| RuntimeError::Config(format!("notify.smtp: {err}")))?;
            Ok(Arc::new(mailer))
        }
        None => Ok(Arc::new(UnconfiguredTransport)),
    }
}

/// Returns the changed settings that only take effect after a restart.
#[must_use]
pub fn restart_required(previous: &MonitorConfig, next: &MonitorConfig) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if previous.storage.site_dir.trim() != next.storage.site_dir.trim() {
        fields.push("storage.site_dir");
    }
    if previous.storage.log_dir.trim() != next.storage.log_dir.trim() {
        fields.push("storage.log_dir");
    }
    if previous.notify.queue_capacity != next.notify.queue_capacity {
        fields.push("notify.queue_capacity");
    }
    let mut previous_server = previous.server.clone();
    previous_server.public_base_url.clone_from(&next.server.public_base_url);
    if previous_server != next.server {
        fields.push("server");
    }
    fields
}

// ============================================================================
// SECTION: Tests
// ============================================================================
