// crates/visa-monitor-cli/src/lib.rs
// ============================================================================
// Module: Visa Monitor CLI Library
// Description: Reusable helpers behind the `visa-monitor` binary.
// Purpose: Expose code generation, cleanup, reporting, service management, and i18n.
// Dependencies: time, serde, toml, thiserror, visa-monitor-core, visa-monitor-runtime, visa-monitor-store
// ============================================================================

//! ## Overview
//! The binary in `main.rs` is a thin clap dispatcher. Everything with
//! behavior worth testing lives here so integration tests can reach it.

pub mod clean;
pub mod codegen;
pub mod i18n;
pub mod report;
pub mod systemd;
