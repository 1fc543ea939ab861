// crates/visa-monitor-store/src/lib.rs
// ============================================================================
// Module: Visa Monitor Store Library
// Description: File-backed persistence for monitor state.
// Purpose: Keep status, users, and failure exports durable across crashes.
// Dependencies: visa-monitor-core, cap-std, serde_json
// ============================================================================

//! ## Overview
//! Every JSON state file is written through [`AtomicFile`]: a same-directory
//! temp file, `fsync`, and an atomic rename, followed by the same bytes to a
//! `.bak` sibling. Loads fall back to the backup when the primary is missing
//! or unreadable, and fail loudly only when neither copy parses.
//!
//! ## Invariants
//! - Readers never observe a partially written document.
//! - A stray temp file from an interrupted write is ignored on load.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod atomic;
pub mod csv;
pub mod failures;
pub mod status_store;
pub mod users;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use atomic::AtomicFile;
pub use atomic::LoadSource;
pub use atomic::Loaded;
pub use csv::CsvTable;
pub use failures::CountersStore;
pub use failures::FailureCounters;
pub use failures::FailureLog;
pub use failures::FailureRecord;
pub use status_store::FileStatusStore;
pub use users::RegistryError;
pub use users::UserCodeRecord;
pub use users::UsersDocument;
pub use users::UsersStore;
