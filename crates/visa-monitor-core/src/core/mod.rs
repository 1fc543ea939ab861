// crates/visa-monitor-core/src/core/mod.rs
// ============================================================================
// Module: Visa Monitor Core Types
// Description: Canonical domain types for codes, statuses, and snapshots.
// Purpose: Provide stable, serializable types shared by every crate.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! Core types describe what is tracked ([`TrackedCode`]), what the portal said
//! ([`NormalizedStatus`]), and what the monitor remembers ([`StatusSnapshot`]).
//! These types are the source of truth for persisted files and the HTTP API.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod identifiers;
pub mod snapshot;
pub mod status;
pub mod time;
pub mod tracked;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use identifiers::Channel;
pub use identifiers::CodeFormatError;
pub use identifiers::CodeOrigin;
pub use identifiers::QueryCode;
pub use identifiers::QueryType;
pub use snapshot::PENDING_LABEL;
pub use snapshot::StatusDocument;
pub use snapshot::StatusSnapshot;
pub use status::NormalizedStatus;
pub use time::Timestamp;
pub use tracked::TrackedCode;
