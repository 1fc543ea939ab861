// crates/visa-monitor-runtime/src/error.rs
// ============================================================================
// Module: Runtime Errors
// Description: Error taxonomy for the daemon, batch runner, and API server.
// Purpose: Map failures onto the process exit code classes.
// Dependencies: thiserror, visa-monitor-config, visa-monitor-core
// ============================================================================

//! ## Overview
//! Portal failures never reach this type; they become `QueryFailed`
//! readings. What remains is fatal: bad configuration, unusable state
//! files, a server that cannot bind, or an execution context that cannot
//! be opened.

// ============================================================================
// SECTION: Imports
// ============================================================================

use thiserror::Error;
use visa_monitor_config::ConfigError;
use visa_monitor_core::ExecutionError;
use visa_monitor_core::StoreError;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Runtime errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuntimeError {
    /// Configuration could not be loaded or validated.
    #[error("runtime config error: {0}")]
    Config(String),
    /// Persisted state could not be read or written.
    #[error("runtime store error: {0}")]
    Store(String),
    /// HTTP server failed.
    #[error("runtime server error: {0}")]
    Server(String),
    /// Execution context could not be opened.
    #[error("runtime execution error: {0}")]
    Execution(String),
}

impl From<ConfigError> for RuntimeError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<StoreError> for RuntimeError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<ExecutionError> for RuntimeError {
    fn from(err: ExecutionError) -> Self {
        Self::Execution(err.to_string())
    }
}
