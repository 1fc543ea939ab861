// crates/visa-monitor-core/src/runtime/mod.rs
// ============================================================================
// Module: Visa Monitor Core Runtime
// Description: Normalizer, LKVS tracker, scheduler math, and retry policy.
// Purpose: Hold every pure decision the monitor makes about a code.
// Dependencies: crate::{core, interfaces}
// ============================================================================

//! ## Overview
//! Runtime modules here are synchronous and clock-free. The async pipeline in
//! `visa-monitor-runtime` calls into them so that every surface (daemon,
//! one-shot, HTTP-triggered checks) makes identical decisions.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod normalizer;
pub mod retry;
pub mod scheduler;
pub mod store;
pub mod tracker;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use normalizer::normalize;
pub use retry::RetryPolicy;
pub use scheduler::CodeChange;
pub use scheduler::TrackedSetDiff;
pub use scheduler::diff_tracked;
pub use scheduler::due_codes;
pub use scheduler::is_due;
pub use scheduler::next_check_at;
pub use scheduler::next_wait;
pub use store::InMemorySnapshotStore;
pub use tracker::NotificationIntent;
pub use tracker::TrackerOutcome;
pub use tracker::TrackerPolicy;
pub use tracker::UnknownPolicy;
pub use tracker::apply_reading;
