// crates/visa-monitor-core/src/core/snapshot.rs
// ============================================================================
// Module: Visa Monitor Status Snapshots
// Description: Observed per-code state and the persisted status document.
// Purpose: Record what the portal last said and what was last known valid.
// Dependencies: crate::core::{identifiers, status, time, tracked}, serde
// ============================================================================

//! ## Overview
//! A [`StatusSnapshot`] is the persisted memory for one code: the latest
//! reading, the last known valid status (LKVS), and failure bookkeeping. A
//! [`StatusDocument`] is the whole-file form written by the state store.
//!
//! ## Invariants
//! - `last_known_valid_status` is never `QueryFailed`.
//! - `status == None` means the code has never been checked.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::core::identifiers::Channel;
use crate::core::identifiers::CodeOrigin;
use crate::core::identifiers::QueryCode;
use crate::core::status::NormalizedStatus;
use crate::core::time::Timestamp;
use crate::core::tracked::TrackedCode;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Display label for codes that have not been checked yet.
pub const PENDING_LABEL: &str = "Pending / 等待查询";

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Observed state for one tracked code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Applicant code.
    pub code: QueryCode,
    /// Latest reading; `None` until the first check.
    pub status: Option<NormalizedStatus>,
    /// Time of the latest check attempt.
    pub last_checked: Option<Timestamp>,
    /// Time the last known valid status last changed.
    pub last_changed: Option<Timestamp>,
    /// Last known valid status.
    pub last_known_valid_status: Option<NormalizedStatus>,
    /// Consecutive failed checks.
    #[serde(default)]
    pub consecutive_fail_count: u32,
    /// Earliest time the scheduler will check this code again.
    #[serde(default)]
    pub next_check: Option<Timestamp>,
    /// Notification channel at the time of the last write.
    #[serde(default)]
    pub channel: Option<Channel>,
    /// Notification target at the time of the last write.
    #[serde(default)]
    pub target: Option<String>,
    /// Polling frequency at the time of the last write.
    #[serde(default)]
    pub freq_minutes: Option<u32>,
    /// Operator note.
    #[serde(default)]
    pub note: Option<String>,
    /// Where the code was declared.
    #[serde(default)]
    pub origin: CodeOrigin,
    /// Time the code first entered the tracked set.
    #[serde(default)]
    pub added_at: Option<Timestamp>,
}

impl StatusSnapshot {
    /// Creates a never-checked snapshot for `tracked`.
    #[must_use]
    pub fn pending(tracked: &TrackedCode, added_at: Timestamp) -> Self {
        let mut snapshot = Self {
            code: tracked.code.clone(),
            status: None,
            last_checked: None,
            last_changed: None,
            last_known_valid_status: None,
            consecutive_fail_count: 0,
            next_check: None,
            channel: None,
            target: None,
            freq_minutes: None,
            note: None,
            origin: tracked.origin,
            added_at: Some(added_at),
        };
        snapshot.refresh_display(tracked);
        snapshot
    }

    /// Copies display fields from the current declaration.
    pub fn refresh_display(&mut self, tracked: &TrackedCode) {
        self.channel = tracked.channel;
        self.target.clone_from(&tracked.target);
        self.freq_minutes = tracked.freq_minutes;
        self.note.clone_from(&tracked.note);
        self.origin = tracked.origin;
    }

    /// Returns the label shown on status surfaces.
    #[must_use]
    pub fn status_label(&self) -> &'static str {
        self.status.map_or(PENDING_LABEL, NormalizedStatus::label)
    }
}

// ============================================================================
// SECTION: Document
// ============================================================================

/// Whole-file status document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDocument {
    /// Time the document was written.
    pub generated_at: Option<Timestamp>,
    /// Snapshots keyed by code.
    #[serde(default)]
    pub items: BTreeMap<QueryCode, StatusSnapshot>,
}

impl StatusDocument {
    /// Builds a document from a snapshot map.
    #[must_use]
    pub const fn new(generated_at: Timestamp, items: BTreeMap<QueryCode, StatusSnapshot>) -> Self {
        Self {
            generated_at: Some(generated_at),
            items,
        }
    }
}
