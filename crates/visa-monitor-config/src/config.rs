// crates/visa-monitor-config/src/config.rs
// ============================================================================
// Module: Visa Monitor Configuration
// Description: Configuration loading and validation for the visa monitor.
// Purpose: Provide strict, fail-closed config parsing with hard limits.
// Dependencies: visa-monitor-core, serde, toml, url
// ============================================================================

//! ## Overview
//! Configuration is loaded from a TOML file with strict size and path limits,
//! then environment overrides are applied, then the result is validated.
//! Missing or invalid configuration fails closed: the daemon refuses to
//! start, and a rejected reload keeps the previous snapshot running.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::SystemTime;

use serde::Deserialize;
use thiserror::Error;
use visa_monitor_core::Channel;
use visa_monitor_core::CodeOrigin;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryType;
use visa_monitor_core::RetryPolicy;
use visa_monitor_core::TrackedCode;
use visa_monitor_core::TrackerPolicy;
use visa_monitor_core::UnknownPolicy;

use crate::env::apply_env_overrides;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default configuration filename when no path is specified.
pub const DEFAULT_CONFIG_NAME: &str = "visa-monitor.toml";
/// Environment variable for the config path.
pub(crate) const CONFIG_ENV_VAR: &str = "VISA_MONITOR_CONFIG";
/// Maximum size of the config file in bytes.
pub(crate) const MAX_CONFIG_FILE_SIZE: usize = 1024 * 1024;
/// Maximum length of a single path component.
pub(crate) const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
pub(crate) const MAX_TOTAL_PATH_LENGTH: usize = 4096;
/// Upper bound on scheduler workers.
pub(crate) const MAX_WORKERS: usize = 64;
/// Upper bound on the default navigation cap.
pub(crate) const MAX_NAV_CAP: usize = 10;
/// Upper bound on retry attempts per check.
pub(crate) const MAX_RETRY_ATTEMPTS: u32 = 10;
/// Upper bound on tracked codes declared in the file.
pub(crate) const MAX_CONFIG_CODES: usize = 10_000;
/// Default portal page URL.
pub(crate) const DEFAULT_PORTAL_URL: &str = "https://ipc.gov.cz/en/status-of-your-application/";
/// Implicit-TLS SMTP port.
pub const SMTP_IMPLICIT_TLS_PORT: u16 = 465;

// ============================================================================
// SECTION: Configuration Types
// ============================================================================

/// Visa monitor configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MonitorConfig {
    /// Scheduler configuration.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Portal retry configuration.
    #[serde(default)]
    pub retry: RetryConfig,
    /// Portal endpoint configuration.
    #[serde(default)]
    pub portal: PortalConfig,
    /// Storage locations.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Notification configuration.
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Self-service HTTP server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Codes declared by the operator.
    #[serde(default)]
    pub codes: Vec<CodeEntry>,
    /// Config source path (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
    /// Config source modification time (not serialized).
    #[serde(skip)]
    pub source_modified_at: Option<SystemTime>,
}

impl MonitorConfig {
    /// Loads configuration from disk using the default resolution rules and
    /// the process environment for overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, |key| env::var(key).ok())
    }

    /// Loads configuration with an explicit override lookup.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading or validation fails.
    pub fn load_with_env<F>(path: Option<&Path>, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let resolved = resolve_path(path)?;
        validate_path(&resolved)?;
        let bytes = fs::read(&resolved).map_err(|err| ConfigError::Io(err.to_string()))?;
        if bytes.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigError::Invalid("config file exceeds size limit".to_string()));
        }
        let content = std::str::from_utf8(&bytes)
            .map_err(|_| ConfigError::Invalid("config file must be utf-8".to_string()))?;
        let mut config = Self::parse_str(content)?;
        config.source_modified_at = fs::metadata(&resolved).and_then(|meta| meta.modified()).ok();
        config.source_path = Some(resolved);
        apply_env_overrides(&mut config, lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML without validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the TOML is malformed.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Validates the configuration for internal consistency.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when configuration is invalid.
    pub fn validate(&mut self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.retry.validate()?;
        self.portal.validate()?;
        self.storage.validate()?;
        self.notify.validate()?;
        self.server.validate()?;
        if self.codes.len() > MAX_CONFIG_CODES {
            return Err(ConfigError::Invalid("too many codes".to_string()));
        }
        for (index, entry) in self.codes.iter().enumerate() {
            entry.to_tracked().map_err(|err| match err {
                ConfigError::Invalid(message) => {
                    ConfigError::Invalid(format!("codes[{index}]: {message}"))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    /// Converts declared codes into tracked codes.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when an entry is invalid.
    pub fn tracked_codes(&self) -> Result<Vec<TrackedCode>, ConfigError> {
        self.codes.iter().map(CodeEntry::to_tracked).collect()
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Frequency for codes without their own.
    #[serde(default = "default_freq_minutes")]
    pub default_freq_minutes: u32,
    /// Concurrent checks per cycle.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Optional navigation cap below `min(10, workers)`.
    #[serde(default)]
    pub nav_cap: Option<usize>,
    /// Upper bound on the wait between cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Treatment of `Unknown` readings.
    #[serde(default)]
    pub unknown_policy: UnknownPolicy,
    /// Whether a first `NotFound` notifies.
    #[serde(default)]
    pub notify_first_not_found: bool,
    /// Lower bound of the pre-submit jitter.
    #[serde(default = "default_jitter_min_ms")]
    pub jitter_min_ms: u64,
    /// Upper bound of the pre-submit jitter.
    #[serde(default = "default_jitter_max_ms")]
    pub jitter_max_ms: u64,
    /// Time in-flight checks get to finish after cancellation.
    #[serde(default = "default_cancel_grace_secs")]
    pub cancel_grace_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_freq_minutes: default_freq_minutes(),
            workers: default_workers(),
            nav_cap: None,
            poll_interval_secs: default_poll_interval_secs(),
            unknown_policy: UnknownPolicy::default(),
            notify_first_not_found: false,
            jitter_min_ms: default_jitter_min_ms(),
            jitter_max_ms: default_jitter_max_ms(),
            cancel_grace_secs: default_cancel_grace_secs(),
        }
    }
}

impl SchedulerConfig {
    /// Validates scheduler settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.default_freq_minutes == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.default_freq_minutes must be positive".to_string(),
            ));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(ConfigError::Invalid(format!(
                "scheduler.workers must be between 1 and {MAX_WORKERS}"
            )));
        }
        if self.nav_cap == Some(0) {
            return Err(ConfigError::Invalid("scheduler.nav_cap must be positive".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.poll_interval_secs must be positive".to_string(),
            ));
        }
        if self.jitter_min_ms > self.jitter_max_ms {
            return Err(ConfigError::Invalid(
                "scheduler.jitter_min_ms must not exceed jitter_max_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the navigation permit count: `min(10, workers)` or lower.
    #[must_use]
    pub fn effective_nav_cap(&self) -> usize {
        let ceiling = self.workers.clamp(1, MAX_NAV_CAP);
        self.nav_cap.map_or(ceiling, |cap| cap.clamp(1, ceiling))
    }

    /// Returns the tracker policy.
    #[must_use]
    pub const fn tracker_policy(&self) -> TrackerPolicy {
        TrackerPolicy {
            unknown: self.unknown_policy,
            notify_first_not_found: self.notify_first_not_found,
        }
    }

    /// Returns the poll interval.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

/// Portal retry configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts per check, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed retry delay.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Per-attempt retry delay increment.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
    /// Retry jitter bound.
    #[serde(default = "default_retry_jitter_ms")]
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            step_delay_ms: default_step_delay_ms(),
            jitter_ms: default_retry_jitter_ms(),
        }
    }
}

impl RetryConfig {
    /// Validates retry settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 || self.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "retry.max_attempts must be between 1 and {MAX_RETRY_ATTEMPTS}"
            )));
        }
        Ok(())
    }

    /// Returns the retry policy value.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            step_delay: Duration::from_millis(self.step_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

/// Portal endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortalConfig {
    /// Portal status page URL.
    #[serde(default = "default_portal_url")]
    pub url: String,
    /// TCP connect timeout.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Whole-request timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Optional user agent override.
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            url: default_portal_url(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            user_agent: None,
        }
    }
}

impl PortalConfig {
    /// Validates portal settings.
    fn validate(&self) -> Result<(), ConfigError> {
        let parsed = url::Url::parse(self.url.trim())
            .map_err(|err| ConfigError::Invalid(format!("portal.url is invalid: {err}")))?;
        if parsed.scheme() != "https" && parsed.scheme() != "http" {
            return Err(ConfigError::Invalid("portal.url must use http or https".to_string()));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(ConfigError::Invalid("portal timeouts must be positive".to_string()));
        }
        if self.connect_timeout_ms > self.request_timeout_ms {
            return Err(ConfigError::Invalid(
                "portal.connect_timeout_ms must not exceed request_timeout_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Storage locations.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Directory holding the public site and its `config/` state.
    #[serde(default = "default_site_dir")]
    pub site_dir: String,
    /// Directory for event logs and failure exports.
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            site_dir: default_site_dir(),
            log_dir: default_log_dir(),
        }
    }
}

impl StorageConfig {
    /// Validates storage paths.
    fn validate(&self) -> Result<(), ConfigError> {
        validate_path_string("storage.site_dir", &self.site_dir)?;
        validate_path_string("storage.log_dir", &self.log_dir)
    }

    /// Returns the directory holding persisted state.
    #[must_use]
    pub fn state_dir(&self) -> PathBuf {
        Path::new(self.site_dir.trim()).join("config")
    }

    /// Returns the status document path.
    #[must_use]
    pub fn status_path(&self) -> PathBuf {
        self.state_dir().join("status.json")
    }

    /// Returns the users registry path.
    #[must_use]
    pub fn users_path(&self) -> PathBuf {
        self.state_dir().join("users.json")
    }

    /// Returns the event log directory.
    #[must_use]
    pub fn log_path(&self) -> PathBuf {
        PathBuf::from(self.log_dir.trim())
    }

    /// Returns the failure export directory.
    #[must_use]
    pub fn fails_dir(&self) -> PathBuf {
        self.log_path().join("fails")
    }
}

/// Notification configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Ordinary emails per sliding minute.
    #[serde(default = "default_email_max_per_minute")]
    pub email_max_per_minute: u32,
    /// Delay applied to first-status emails.
    #[serde(default = "default_email_first_check_delay_secs")]
    pub email_first_check_delay_secs: u64,
    /// Delivery attempts per email.
    #[serde(default = "default_max_send_attempts")]
    pub max_send_attempts: u32,
    /// Ordinary queue capacity.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// SMTP relay; notifications are disabled when absent.
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            email_max_per_minute: default_email_max_per_minute(),
            email_first_check_delay_secs: default_email_first_check_delay_secs(),
            max_send_attempts: default_max_send_attempts(),
            queue_capacity: default_queue_capacity(),
            smtp: None,
        }
    }
}

impl NotifyConfig {
    /// Validates notification settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.email_max_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "notify.email_max_per_minute must be positive".to_string(),
            ));
        }
        if self.max_send_attempts == 0 {
            return Err(ConfigError::Invalid(
                "notify.max_send_attempts must be positive".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid("notify.queue_capacity must be positive".to_string()));
        }
        if let Some(smtp) = &self.smtp {
            smtp.validate()?;
        }
        Ok(())
    }
}

/// SMTP relay settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    /// Relay host.
    pub host: String,
    /// Relay port; 465 uses implicit TLS, others STARTTLS.
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Login user.
    #[serde(default)]
    pub user: Option<String>,
    /// Login password.
    #[serde(default)]
    pub pass: Option<String>,
    /// Sender address.
    pub from: String,
    /// Per-command timeout.
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
    /// Idle lifetime of pooled connections.
    #[serde(default = "default_smtp_idle_secs")]
    pub pool_idle_secs: u64,
}

impl SmtpConfig {
    /// Validates relay settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("notify.smtp.host must be non-empty".to_string()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("notify.smtp.port must be positive".to_string()));
        }
        if !looks_like_email(&self.from) {
            return Err(ConfigError::Invalid(
                "notify.smtp.from must be an email address".to_string(),
            ));
        }
        if self.user.is_some() != self.pass.is_some() {
            return Err(ConfigError::Invalid(
                "notify.smtp.user and notify.smtp.pass must be set together".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns true when the relay expects TLS from the first byte.
    #[must_use]
    pub const fn implicit_tls(&self) -> bool {
        self.port == SMTP_IMPLICIT_TLS_PORT
    }
}

/// Self-service HTTP server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Whether the API is served.
    #[serde(default)]
    pub enabled: bool,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Public URL used in verification links.
    #[serde(default)]
    pub public_base_url: Option<String>,
    /// Requests per IP per sliding minute.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: u32,
    /// Interval of the expired-entry sweep.
    #[serde(default = "default_cleanup_interval_secs")]
    pub cleanup_interval_secs: u64,
    /// Maximum request body size in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: default_bind(),
            public_base_url: None,
            rate_limit_per_minute: default_rate_limit_per_minute(),
            cleanup_interval_secs: default_cleanup_interval_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl ServerConfig {
    /// Validates server settings.
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        self.bind_addr()?;
        if self.rate_limit_per_minute == 0 {
            return Err(ConfigError::Invalid(
                "server.rate_limit_per_minute must be positive".to_string(),
            ));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "server.cleanup_interval_secs must be positive".to_string(),
            ));
        }
        if let Some(base) = &self.public_base_url {
            url::Url::parse(base.trim()).map_err(|err| {
                ConfigError::Invalid(format!("server.public_base_url is invalid: {err}"))
            })?;
        }
        Ok(())
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the address is malformed.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.bind
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("server.bind must be host:port".to_string()))
    }
}

/// One operator-declared code.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeEntry {
    /// Applicant code.
    pub code: String,
    /// Channel label; empty disables notifications.
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Notification address.
    #[serde(default)]
    pub target: Option<String>,
    /// Per-code frequency.
    #[serde(default)]
    pub freq_minutes: Option<u32>,
    /// Operator note.
    #[serde(default)]
    pub note: Option<String>,
    /// Portal variant.
    #[serde(default)]
    pub query_type: QueryType,
}

impl CodeEntry {
    /// Validates the entry and converts it into a tracked code.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when any field is malformed.
    pub fn to_tracked(&self) -> Result<TrackedCode, ConfigError> {
        let code = QueryCode::new(&self.code);
        self.query_type
            .validate_code(&code)
            .map_err(|err| ConfigError::Invalid(err.to_string()))?;
        let channel = Channel::parse(&self.channel)
            .map_err(|label| ConfigError::Invalid(format!("unsupported channel: {label}")))?;
        let target = self
            .target
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);
        if channel.is_some() {
            match &target {
                None => {
                    return Err(ConfigError::Invalid(format!(
                        "{code}: target required when channel is set"
                    )));
                }
                Some(address) if !looks_like_email(address) => {
                    return Err(ConfigError::Invalid(format!(
                        "{code}: target must be an email address"
                    )));
                }
                Some(_) => {}
            }
        }
        if self.freq_minutes == Some(0) {
            return Err(ConfigError::Invalid(format!("{code}: freq_minutes must be positive")));
        }
        Ok(TrackedCode {
            code,
            channel,
            target,
            freq_minutes: self.freq_minutes,
            note: self.note.clone().filter(|note| !note.trim().is_empty()),
            query_type: self.query_type,
            origin: CodeOrigin::Config,
        })
    }
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration loading or validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O failure while reading configuration.
    #[error("config io error: {0}")]
    Io(String),
    /// TOML parsing error.
    #[error("config parse error: {0}")]
    Parse(String),
    /// Invalid configuration data.
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves the config path from explicit input, environment, or default.
///
/// # Errors
///
/// Returns [`ConfigError::Invalid`] when the env path is too long.
pub fn resolve_path(path: Option<&Path>) -> Result<PathBuf, ConfigError> {
    if let Some(path) = path {
        return Ok(path.to_path_buf());
    }
    if let Ok(env_path) = env::var(CONFIG_ENV_VAR) {
        if env_path.len() > MAX_TOTAL_PATH_LENGTH {
            return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
        }
        return Ok(PathBuf::from(env_path));
    }
    Ok(PathBuf::from(DEFAULT_CONFIG_NAME))
}

/// Validates the resolved path against length limits.
fn validate_path(path: &Path) -> Result<(), ConfigError> {
    let text = path.to_string_lossy();
    if text.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid("config path exceeds max length".to_string()));
    }
    for component in path.components() {
        let value = component.as_os_str().to_string_lossy();
        if value.len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid("config path component too long".to_string()));
        }
    }
    Ok(())
}

/// Validates a path string against length constraints.
fn validate_path_string(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::Invalid(format!("{field} must be non-empty")));
    }
    if trimmed.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(ConfigError::Invalid(format!("{field} exceeds max length")));
    }
    for component in Path::new(trimmed).components() {
        if component.as_os_str().to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH {
            return Err(ConfigError::Invalid(format!("{field} path component too long")));
        }
    }
    Ok(())
}

/// Minimal address shape check: one `@` with text on both sides and a dot in
/// the domain.
#[must_use]
pub fn looks_like_email(value: &str) -> bool {
    let trimmed = value.trim();
    let Some((local, domain)) = trimmed.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !trimmed.chars().any(char::is_whitespace)
}

/// Default for `scheduler.default_freq_minutes`.
pub(crate) const fn default_freq_minutes() -> u32 {
    60
}

/// Default for `scheduler.workers`.
pub(crate) const fn default_workers() -> usize {
    1
}

/// Default for `scheduler.poll_interval_secs`.
pub(crate) const fn default_poll_interval_secs() -> u64 {
    300
}

/// Default for `scheduler.jitter_min_ms`.
pub(crate) const fn default_jitter_min_ms() -> u64 {
    10
}

/// Default for `scheduler.jitter_max_ms`.
pub(crate) const fn default_jitter_max_ms() -> u64 {
    60
}

/// Default for `scheduler.cancel_grace_secs`.
pub(crate) const fn default_cancel_grace_secs() -> u64 {
    10
}

/// Default for `retry.max_attempts`.
pub(crate) const fn default_max_attempts() -> u32 {
    visa_monitor_core::runtime::retry::DEFAULT_MAX_ATTEMPTS
}

/// Default for `retry.base_delay_ms`.
pub(crate) const fn default_base_delay_ms() -> u64 {
    visa_monitor_core::runtime::retry::DEFAULT_BASE_DELAY_MS
}

/// Default for `retry.step_delay_ms`.
pub(crate) const fn default_step_delay_ms() -> u64 {
    visa_monitor_core::runtime::retry::DEFAULT_STEP_DELAY_MS
}

/// Default for `retry.jitter_ms`.
pub(crate) const fn default_retry_jitter_ms() -> u64 {
    visa_monitor_core::runtime::retry::DEFAULT_JITTER_MS
}

/// Default for `portal.url`.
pub(crate) fn default_portal_url() -> String {
    DEFAULT_PORTAL_URL.to_string()
}

/// Default for `portal.connect_timeout_ms`.
pub(crate) const fn default_connect_timeout_ms() -> u64 {
    5_000
}

/// Default for `portal.request_timeout_ms`.
pub(crate) const fn default_request_timeout_ms() -> u64 {
    15_000
}

/// Default for `storage.site_dir`.
pub(crate) fn default_site_dir() -> String {
    "site".to_string()
}

/// Default for `storage.log_dir`.
pub(crate) fn default_log_dir() -> String {
    "logs/monitor".to_string()
}

/// Default for `notify.email_max_per_minute`.
pub(crate) const fn default_email_max_per_minute() -> u32 {
    10
}

/// Default for `notify.email_first_check_delay_secs`.
pub(crate) const fn default_email_first_check_delay_secs() -> u64 {
    30
}

/// Default for `notify.max_send_attempts`.
pub(crate) const fn default_max_send_attempts() -> u32 {
    3
}

/// Default for `notify.queue_capacity`.
pub(crate) const fn default_queue_capacity() -> usize {
    1_024
}

/// Default for `notify.smtp.port`.
pub(crate) const fn default_smtp_port() -> u16 {
    SMTP_IMPLICIT_TLS_PORT
}

/// Default for `notify.smtp.timeout_secs`.
pub(crate) const fn default_smtp_timeout_secs() -> u64 {
    30
}

/// Default for `notify.smtp.pool_idle_secs`.
pub(crate) const fn default_smtp_idle_secs() -> u64 {
    300
}

/// Default for `server.bind`.
pub(crate) fn default_bind() -> String {
    "127.0.0.1:8000".to_string()
}

/// Default for `server.rate_limit_per_minute`.
pub(crate) const fn default_rate_limit_per_minute() -> u32 {
    100
}

/// Default for `server.cleanup_interval_secs`.
pub(crate) const fn default_cleanup_interval_secs() -> u64 {
    300
}

/// Default for `server.max_body_bytes`.
pub(crate) const fn default_max_body_bytes() -> usize {
    64 * 1024
}

/// Default for `codes[].channel`.
pub(crate) fn default_channel() -> String {
    Channel::Email.as_str().to_string()
}

// ============================================================================
// SECTION: Tests
// ============================================================================
