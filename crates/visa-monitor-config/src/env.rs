// crates/visa-monitor-config/src/env.rs
// ============================================================================
// Module: Visa Monitor Environment Overrides
// Description: Scalar config overrides read from `VISA_MONITOR_*` variables.
// Purpose: Let deployments inject secrets and tuning without editing the file.
// Dependencies: crate::config
// ============================================================================

//! ## Overview
//! Overrides are applied after TOML parsing and before validation, so an
//! override can never bypass a limit. The lookup is injected; production
//! passes the process environment, tests pass a map.
//!
//! ## Invariants
//! - An unparseable override is a config error, never ignored.
//! - SMTP overrides create the relay section when the file has none; the
//!   section must still validate (host and sender required).

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::str::FromStr;

use visa_monitor_core::UnknownPolicy;

use crate::config::ConfigError;
use crate::config::MonitorConfig;
use crate::config::SmtpConfig;
use crate::config::default_smtp_idle_secs;
use crate::config::default_smtp_port;
use crate::config::default_smtp_timeout_secs;

// ============================================================================
// SECTION: Keys
// ============================================================================

/// Overrides `scheduler.default_freq_minutes`.
pub const ENV_DEFAULT_FREQ_MINUTES: &str = "VISA_MONITOR_DEFAULT_FREQ_MINUTES";
/// Overrides `scheduler.workers`.
pub const ENV_WORKERS: &str = "VISA_MONITOR_WORKERS";
/// Overrides `scheduler.nav_cap`.
pub const ENV_NAV_CAP: &str = "VISA_MONITOR_NAV_CAP";
/// Overrides `scheduler.unknown_policy`.
pub const ENV_UNKNOWN_POLICY: &str = "VISA_MONITOR_UNKNOWN_POLICY";
/// Overrides `notify.smtp.host`.
pub const ENV_SMTP_HOST: &str = "VISA_MONITOR_SMTP_HOST";
/// Overrides `notify.smtp.port`.
pub const ENV_SMTP_PORT: &str = "VISA_MONITOR_SMTP_PORT";
/// Overrides `notify.smtp.user`.
pub const ENV_SMTP_USER: &str = "VISA_MONITOR_SMTP_USER";
/// Overrides `notify.smtp.pass`.
pub const ENV_SMTP_PASS: &str = "VISA_MONITOR_SMTP_PASS";
/// Overrides `notify.smtp.from`.
pub const ENV_SMTP_FROM: &str = "VISA_MONITOR_SMTP_FROM";
/// Overrides `notify.email_max_per_minute`.
pub const ENV_EMAIL_MAX_PER_MINUTE: &str = "VISA_MONITOR_EMAIL_MAX_PER_MINUTE";
/// Overrides `storage.site_dir`.
pub const ENV_SITE_DIR: &str = "VISA_MONITOR_SITE_DIR";
/// Overrides `storage.log_dir`.
pub const ENV_LOG_DIR: &str = "VISA_MONITOR_LOG_DIR";

// ============================================================================
// SECTION: Overrides
// ============================================================================

/// Applies every override present in `lookup` to `config`.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] naming the variable when a value does
/// not parse.
pub fn apply_env_overrides<F>(config: &mut MonitorConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|value| value.trim().to_string());

    if let Some(value) = get(ENV_DEFAULT_FREQ_MINUTES) {
        config.scheduler.default_freq_minutes = parse_number(ENV_DEFAULT_FREQ_MINUTES, &value)?;
    }
    if let Some(value) = get(ENV_WORKERS) {
        config.scheduler.workers = parse_number(ENV_WORKERS, &value)?;
    }
    if let Some(value) = get(ENV_NAV_CAP) {
        config.scheduler.nav_cap = Some(parse_number(ENV_NAV_CAP, &value)?);
    }
    if let Some(value) = get(ENV_UNKNOWN_POLICY) {
        config.scheduler.unknown_policy = UnknownPolicy::parse(&value).ok_or_else(|| {
            ConfigError::Invalid(format!("{ENV_UNKNOWN_POLICY} must be track or suppress"))
        })?;
    }
    if let Some(value) = get(ENV_EMAIL_MAX_PER_MINUTE) {
        config.notify.email_max_per_minute = parse_number(ENV_EMAIL_MAX_PER_MINUTE, &value)?;
    }
    if let Some(value) = get(ENV_SITE_DIR) {
        config.storage.site_dir = value;
    }
    if let Some(value) = get(ENV_LOG_DIR) {
        config.storage.log_dir = value;
    }

    let smtp_keys = [ENV_SMTP_HOST, ENV_SMTP_PORT, ENV_SMTP_USER, ENV_SMTP_PASS, ENV_SMTP_FROM];
    if smtp_keys.iter().any(|key| get(key).is_some()) {
        let smtp = config.notify.smtp.get_or_insert_with(empty_smtp);
        if let Some(value) = get(ENV_SMTP_HOST) {
            smtp.host = value;
        }
        if let Some(value) = get(ENV_SMTP_PORT) {
            smtp.port = parse_number(ENV_SMTP_PORT, &value)?;
        }
        if let Some(value) = get(ENV_SMTP_USER) {
            smtp.user = Some(value);
        }
        if let Some(value) = get(ENV_SMTP_PASS) {
            smtp.pass = Some(value);
        }
        if let Some(value) = get(ENV_SMTP_FROM) {
            smtp.from = value;
        }
    }
    Ok(())
}

/// Parses a numeric override.
fn parse_number<T: FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid(format!("{key} must be a number")))
}

/// Relay section created by overrides when the file declares none.
fn empty_smtp() -> SmtpConfig {
    SmtpConfig {
        host: String::new(),
        port: default_smtp_port(),
        user: None,
        pass: None,
        from: String::new(),
        timeout_secs: default_smtp_timeout_secs(),
        pool_idle_secs: default_smtp_idle_secs(),
    }
}

// ============================================================================
// SECTION: Tests
// ============================================================================
