// crates/visa-monitor-runtime/src/lib.rs
// ============================================================================
// Module: Visa Monitor Runtime Library
// Description: Async execution layer for the visa status monitor.
// Purpose: Run cycles, the daemon loop, the portal client, and the API.
// Dependencies: visa-monitor-{core,config,store,notify}, tokio, axum, reqwest
// ============================================================================

//! ## Overview
//! The runtime owns everything that waits: the concurrency dispatcher that
//! fans checks out against the portal, the cycle pipeline that persists and
//! announces readings, the monitor loop with hot reload and signal handling,
//! the one-shot batch checker, and the self-service HTTP API.
//!
//! ## Invariants
//! - Config snapshots are swapped only between cycles.
//! - Every completed reading is persisted before its notification is queued.
//! - The execution context is closed on every exit path of a dispatch.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod batch;
pub mod clock;
pub mod cycle;
pub mod dispatcher;
pub mod error;
pub mod html;
pub mod monitor;
pub mod portal;
pub mod reload;
pub mod server;
pub mod state;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use batch::BatchReport;
pub use batch::BatchRunner;
pub use batch::BatchSettings;
pub use clock::Clock;
pub use clock::ManualClock;
pub use clock::SystemClock;
pub use cycle::CycleDeps;
pub use cycle::CycleOutcome;
pub use cycle::CycleReport;
pub use cycle::run_cycle;
pub use dispatcher::CheckReading;
pub use dispatcher::ConcurrencyDispatcher;
pub use dispatcher::DispatchSettings;
pub use dispatcher::DispatchSummary;
pub use error::RuntimeError;
pub use monitor::ControlMessage;
pub use monitor::Monitor;
pub use monitor::MonitorHandle;
pub use monitor::spawn_config_watcher;
pub use monitor::spawn_signal_listener;
pub use portal::PortalExecutor;
pub use portal::PortalSettings;
pub use reload::Reconfigure;
pub use reload::mail_transport;
pub use server::ApiSettings;
pub use server::ApiState;
pub use state::LoadedState;
pub use state::StateStores;
pub use state::load_state;
