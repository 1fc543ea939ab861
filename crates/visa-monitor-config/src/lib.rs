// crates/visa-monitor-config/src/lib.rs
// ============================================================================
// Module: Visa Monitor Config Library
// Description: Canonical config model, env overrides, and tracked-set snapshots.
// Purpose: Single source of truth for visa-monitor.toml semantics.
// Dependencies: visa-monitor-core, serde, toml
// ============================================================================

//! ## Overview
//! `visa-monitor-config` defines the configuration model for the monitor. It
//! provides strict, fail-closed validation and produces immutable
//! [`ConfigSnapshot`] values that the scheduler swaps only between cycles.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;
pub mod env;
pub mod examples;
pub mod snapshot;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::*;
pub use env::apply_env_overrides;
pub use examples::config_toml_example;
pub use snapshot::ConfigSnapshot;
