// crates/visa-monitor-core/src/core/tracked.rs
// ============================================================================
// Module: Visa Monitor Tracked Codes
// Description: Declarative description of one monitored applicant code.
// Purpose: Carry per-code polling and notification settings into the scheduler.
// Dependencies: crate::core::identifiers, serde
// ============================================================================

//! ## Overview
//! A [`TrackedCode`] is what the operator (config file) or a verified user
//! (self-service registration) asked the monitor to watch. It holds no
//! observed state; that lives in [`crate::core::StatusSnapshot`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Channel;
use crate::core::identifiers::CodeOrigin;
use crate::core::identifiers::QueryCode;
use crate::core::identifiers::QueryType;

// ============================================================================
// SECTION: Types
// ============================================================================

/// One code the monitor is asked to poll.
///
/// # Invariants
/// - `code` is unique across the tracked set.
/// - `freq_minutes`, when present, is strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedCode {
    /// Applicant code.
    pub code: QueryCode,
    /// Notification channel; `None` disables notifications.
    pub channel: Option<Channel>,
    /// Notification address for the channel.
    pub target: Option<String>,
    /// Per-code polling frequency in minutes.
    pub freq_minutes: Option<u32>,
    /// Operator note shown on the status surface.
    pub note: Option<String>,
    /// Portal variant used to check this code.
    #[serde(default)]
    pub query_type: QueryType,
    /// Where this code was declared.
    #[serde(default)]
    pub origin: CodeOrigin,
}

impl TrackedCode {
    /// Creates a config-origin code with email notifications to `target`.
    #[must_use]
    pub fn email(code: QueryCode, target: impl Into<String>) -> Self {
        Self {
            code,
            channel: Some(Channel::Email),
            target: Some(target.into()),
            freq_minutes: None,
            note: None,
            query_type: QueryType::default(),
            origin: CodeOrigin::Config,
        }
    }

    /// Returns the frequency to use, falling back to `default_minutes`.
    #[must_use]
    pub fn effective_freq(&self, default_minutes: u32) -> u32 {
        self.freq_minutes.filter(|minutes| *minutes > 0).unwrap_or(default_minutes).max(1)
    }

    /// Returns the delivery target when notifications are enabled.
    #[must_use]
    pub fn notification_target(&self) -> Option<(Channel, &str)> {
        let channel = self.channel?;
        let target = self.target.as_deref().map(str::trim).filter(|value| !value.is_empty())?;
        Some((channel, target))
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_freq_falls_back_to_default() {
        let mut code = TrackedCode::email(QueryCode::new("PEKI202506020001"), "a@example.com");
        assert_eq!(code.effective_freq(60), 60);
        code.freq_minutes = Some(15);
        assert_eq!(code.effective_freq(60), 15);
        code.freq_minutes = Some(0);
        assert_eq!(code.effective_freq(60), 60);
    }

    #[test]
    fn notification_target_requires_channel_and_address() {
        let mut code = TrackedCode::email(QueryCode::new("PEKI202506020001"), "a@example.com");
        assert_eq!(code.notification_target(), Some((Channel::Email, "a@example.com")));
        code.target = Some("  ".to_string());
        assert_eq!(code.notification_target(), None);
        code.target = Some("a@example.com".to_string());
        code.channel = None;
        assert_eq!(code.notification_target(), None);
    }
}
