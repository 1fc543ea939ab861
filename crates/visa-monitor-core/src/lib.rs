// crates/visa-monitor-core/src/lib.rs
// ============================================================================
// Module: Visa Monitor Core Library
// Description: Public API surface for the visa monitor core.
// Purpose: Expose domain types, interfaces, and pure runtime decisions.
// Dependencies: crate::{core, events, interfaces, runtime}
// ============================================================================

//! ## Overview
//! Visa monitor core owns the scheduling and notification-deduplication
//! rules: which codes are due, how a portal reading becomes a normalized
//! status, and when a change is worth telling the applicant about. It is
//! backend-agnostic and reaches portals, disks, and mail relays only through
//! explicit interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod core;
pub mod events;
pub mod interfaces;
pub mod runtime;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use core::*;

pub use events::MonitorEvent;
pub use events::MonitorEventSink;
pub use interfaces::ExecutionError;
pub use interfaces::MailError;
pub use interfaces::MailTransport;
pub use interfaces::OutboundEmail;
pub use interfaces::QueryExecutor;
pub use interfaces::RawStatusText;
pub use interfaces::SnapshotStore;
pub use interfaces::StoreError;
pub use runtime::InMemorySnapshotStore;
pub use runtime::NotificationIntent;
pub use runtime::RetryPolicy;
pub use runtime::TrackedSetDiff;
pub use runtime::TrackerOutcome;
pub use runtime::TrackerPolicy;
pub use runtime::UnknownPolicy;
pub use runtime::apply_reading;
pub use runtime::due_codes;
pub use runtime::normalize;
