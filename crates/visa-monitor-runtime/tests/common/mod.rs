// crates/visa-monitor-runtime/tests/common/mod.rs
// ============================================================================
// Module: Common Test Utilities
// Description: Shared fixtures for visa-monitor-runtime tests.
// Purpose: Provide a scripted portal, a recording mail relay, and config builders.
// Dependencies: visa-monitor-{core,config,notify}, tokio, async-trait
// ============================================================================

//! ## Overview
//! [`ScriptedExecutor`] replays per-code responses and records peak
//! concurrency of both gated phases. [`RecordingTransport`] captures every
//! email. Config helpers write a valid TOML file under a temp directory.

#![allow(
    dead_code,
    unused_imports,
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Shared fixtures are compiled into every test target; each uses a subset."
)]

use std::collections::HashMap;
use std::collections::VecDeque;
use std::future::pending;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use visa_monitor_config::MonitorConfig;
use visa_monitor_core::ExecutionError;
use visa_monitor_core::MailError;
use visa_monitor_core::MailTransport;
use visa_monitor_core::OutboundEmail;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryExecutor;
use visa_monitor_core::QueryType;
use visa_monitor_core::RawStatusText;
use visa_monitor_core::RetryPolicy;
use visa_monitor_core::Timestamp;
use visa_monitor_notify::NotifierSettings;
use visa_monitor_runtime::DispatchSettings;

// ============================================================================
// SECTION: Portal Fixture
// ============================================================================

/// Portal text that normalizes to `Proceedings`.
pub const PROCEEDINGS_TEXT: &str = "Your application is still in proceedings.";
/// Portal text that normalizes to `Granted`.
pub const GRANTED_TEXT: &str = "The application was granted. For information on how to proceed, visit the office.";

/// One scripted portal response.
#[derive(Debug, Clone)]
pub enum Step {
    /// Result text returned after submission.
    Text(String),
    /// Transient failure.
    Fail(String),
    /// Submission that never completes.
    Hang,
}

impl Step {
    pub fn text(value: &str) -> Self {
        Self::Text(value.to_string())
    }

    pub fn fail(value: &str) -> Self {
        Self::Fail(value.to_string())
    }
}

/// Decrements a gauge on drop.
struct Active<'a>(&'a AtomicUsize);

impl<'a> Active<'a> {
    fn enter(gauge: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = gauge.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self(gauge)
    }
}

impl Drop for Active<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Executor replaying scripted responses per code.
#[derive(Default)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, VecDeque<Step>>>,
    fallback: Mutex<Option<Step>>,
    open_error: Mutex<Option<String>>,
    pub nav_delay: Duration,
    pub fill_delay: Duration,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    nav_active: AtomicUsize,
    pub nav_peak: AtomicUsize,
    fill_active: AtomicUsize,
    pub fill_peak: AtomicUsize,
    submissions: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delays(nav_delay: Duration, fill_delay: Duration) -> Self {
        Self {
            nav_delay,
            fill_delay,
            ..Self::default()
        }
    }

    /// Queues `steps` for `code`.
    pub fn script(&self, code: &str, steps: Vec<Step>) {
        self.scripts.lock().unwrap().entry(code.to_string()).or_default().extend(steps);
    }

    /// Response used once a code's script is exhausted.
    pub fn fallback(&self, step: Step) {
        *self.fallback.lock().unwrap() = Some(step);
    }

    pub fn fail_open(&self, message: &str) {
        *self.open_error.lock().unwrap() = Some(message.to_string());
    }

    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }

    fn next_step(&self, code: &QueryCode) -> Step {
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(code.as_str())
            .and_then(VecDeque::pop_front);
        scripted
            .or_else(|| self.fallback.lock().unwrap().clone())
            .unwrap_or_else(|| Step::text(PROCEEDINGS_TEXT))
    }
}

#[async_trait]
impl QueryExecutor for ScriptedExecutor {
    type Context = ();
    type Page = ();

    async fn open_context(&self) -> Result<Self::Context, ExecutionError> {
        if let Some(message) = self.open_error.lock().unwrap().clone() {
            return Err(ExecutionError::Transient(message));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(
        &self,
        _context: &Self::Context,
        _query_type: QueryType,
    ) -> Result<Self::Page, ExecutionError> {
        let _active = Active::enter(&self.nav_active, &self.nav_peak);
        sleep(self.nav_delay).await;
        Ok(())
    }

    async fn fill_and_read(
        &self,
        _context: &Self::Context,
        _page: Self::Page,
        code: &QueryCode,
    ) -> Result<RawStatusText, ExecutionError> {
        let _active = Active::enter(&self.fill_active, &self.fill_peak);
        self.submissions.lock().unwrap().push(code.to_string());
        sleep(self.fill_delay).await;
        match self.next_step(code) {
            Step::Text(text) => Ok(RawStatusText(text)),
            Step::Fail(message) => Err(ExecutionError::Transient(message)),
            Step::Hang => pending().await,
        }
    }

    async fn close_context(&self, _context: Self::Context) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// ============================================================================
// SECTION: Mail Fixture
// ============================================================================

/// Transport that records every email.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutboundEmail>>,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// Notifier settings with no first-status delay.
pub fn notifier_settings() -> NotifierSettings {
    NotifierSettings {
        max_per_minute: 100,
        first_check_delay: Duration::ZERO,
        max_send_attempts: 1,
        retry_backoff: Duration::from_millis(10),
        queue_capacity: 32,
        public_base_url: Some("https://visa.example.com".to_string()),
    }
}

// ============================================================================
// SECTION: Config Fixture
// ============================================================================

/// One `[[codes]]` entry.
pub struct CodeSpec<'a> {
    pub code: &'a str,
    pub target: Option<&'a str>,
    pub freq_minutes: u32,
}

impl<'a> CodeSpec<'a> {
    pub const fn email(code: &'a str, target: &'a str) -> Self {
        Self {
            code,
            target: Some(target),
            freq_minutes: 60,
        }
    }

    pub const fn silent(code: &'a str) -> Self {
        Self {
            code,
            target: None,
            freq_minutes: 60,
        }
    }
}

/// Renders a config TOML rooted at `root`.
pub fn config_toml(root: &Path, codes: &[CodeSpec<'_>]) -> String {
    let mut toml = format!(
        "[scheduler]\ndefault_freq_minutes = 60\nworkers = 2\npoll_interval_secs = 300\njitter_min_ms = 0\njitter_max_ms = 0\n\n\
         [retry]\nmax_attempts = 1\n\n\
         [storage]\nsite_dir = \"{}\"\nlog_dir = \"{}\"\n\n",
        root.join("site").display(),
        root.join("logs").display(),
    );
    for entry in codes {
        toml.push_str(&format!("[[codes]]\ncode = \"{}\"\n", entry.code));
        match entry.target {
            Some(target) => {
                toml.push_str(&format!("channel = \"email\"\ntarget = \"{target}\"\n"));
            }
            None => toml.push_str("channel = \"\"\n"),
        }
        toml.push_str(&format!("freq_minutes = {}\n\n", entry.freq_minutes));
    }
    toml
}

/// Writes `config.toml` under `root` and returns its path.
pub fn write_config(root: &Path, codes: &[CodeSpec<'_>]) -> PathBuf {
    let path = root.join("config.toml");
    std::fs::write(&path, config_toml(root, codes)).unwrap();
    path
}

/// Parses and validates a config rooted at `root`.
pub fn monitor_config(root: &Path, codes: &[CodeSpec<'_>]) -> MonitorConfig {
    let mut config = MonitorConfig::parse_str(&config_toml(root, codes)).unwrap();
    config.validate().unwrap();
    config
}

/// Dispatcher settings without pauses.
pub fn fast_dispatch(workers: usize, nav_cap: usize, max_attempts: u32) -> DispatchSettings {
    DispatchSettings {
        workers,
        nav_cap,
        jitter_min: Duration::ZERO,
        jitter_max: Duration::ZERO,
        retry: RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(5),
            step_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        },
        cancel_grace: Duration::from_millis(200),
    }
}

/// Fixed start time for clock-driven tests.
pub fn start_time() -> Timestamp {
    Timestamp::from_unix_millis(1_750_000_000_000).unwrap()
}
