// crates/visa-monitor-runtime/src/monitor.rs
// ============================================================================
// Module: Monitor Loop
// Description: Long-running daemon loop with hot reload and graceful shutdown.
// Purpose: Run sequential cycles and swap configuration at cycle boundaries.
// Dependencies: crate::{cycle, state}, tokio
// ============================================================================

//! ## Overview
//! The monitor owns the current [`ConfigSnapshot`] behind an `Arc` and only
//! replaces it between cycles. Reload requests, immediate-check requests,
//! and shutdown arrive as [`ControlMessage`]s from the config-file watcher,
//! the signal listener, and the HTTP API. Shutdown additionally flips a
//! watch flag so an in-flight cycle stops at its next suspension point.
//!
//! A reload also stages every registered [`Reconfigure`] target (mail relay,
//! portal client) and moves the failure export when the log directory
//! changes. Settings that cannot move at runtime are reported in a
//! `config_restart_required` event.
//!
//! ## Invariants
//! - Cycles never overlap.
//! - A rejected reload keeps the previous snapshot and every target's
//!   previous settings running.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use visa_monitor_config::ConfigSnapshot;
use visa_monitor_config::MonitorConfig;
use visa_monitor_core::MonitorEvent;
use visa_monitor_core::MonitorEventSink;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryExecutor;
use visa_monitor_core::events;
use visa_monitor_core::runtime::diff_tracked;
use visa_monitor_core::runtime::next_wait;
use visa_monitor_store::FailureLog;
use visa_monitor_store::UsersStore;

use crate::cycle::CycleDeps;
use crate::cycle::CycleOutcome;
use crate::cycle::run_cycle;
use crate::dispatcher::cancelled;
use crate::error::RuntimeError;
use crate::reload::Reconfigure;
use crate::reload::StagedChange;
use crate::reload::restart_required;
use crate::state::build_snapshot;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Control channel depth.
const CONTROL_CAPACITY: usize = 16;
/// Config file poll interval.
pub const CONFIG_WATCH_INTERVAL: Duration = Duration::from_secs(2);

// ============================================================================
// SECTION: Control
// ============================================================================

/// Requests handled between cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlMessage {
    /// Re-read the config file and user codes.
    Reload,
    /// Re-read user codes and start a cycle now.
    CheckNow,
    /// Stop after the current cycle.
    Shutdown,
}

/// Cloneable handle for steering a running monitor.
#[derive(Clone)]
pub struct MonitorHandle {
    /// Control channel.
    control: mpsc::Sender<ControlMessage>,
    /// Shutdown flag observed by in-flight cycles.
    shutdown: Arc<watch::Sender<bool>>,
    /// Current snapshot feed.
    snapshots: watch::Receiver<Arc<ConfigSnapshot>>,
}

impl MonitorHandle {
    /// Creates a handle with no monitor behind it, returning the control
    /// receiver. Used by the API server when scheduling runs elsewhere.
    #[must_use]
    pub fn detached(snapshot: Arc<ConfigSnapshot>) -> (Self, mpsc::Receiver<ControlMessage>) {
        let (control, receiver) = mpsc::channel(CONTROL_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let (_, snapshots) = watch::channel(snapshot);
        (
            Self {
                control,
                shutdown: Arc::new(shutdown),
                snapshots,
            },
            receiver,
        )
    }

    /// Queues a control message. Returns false when the monitor is gone.
    pub async fn send(&self, message: ControlMessage) -> bool {
        self.control.send(message).await.is_ok()
    }

    /// Queues a control message without waiting. Returns false when the
    /// queue is full or the monitor is gone.
    #[must_use]
    pub fn try_send(&self, message: ControlMessage) -> bool {
        self.control.try_send(message).is_ok()
    }

    /// Flags shutdown and wakes the loop.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
        let _ = self.control.try_send(ControlMessage::Shutdown);
    }

    /// Returns the snapshot currently in effect.
    #[must_use]
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.snapshots.borrow())
    }

    /// Returns a receiver notified on every snapshot swap.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Arc<ConfigSnapshot>> {
        self.snapshots.clone()
    }
}

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Daemon loop.
pub struct Monitor<E: QueryExecutor> {
    /// Cycle collaborators.
    deps: CycleDeps<E>,
    /// Config file to reload from.
    config_path: Option<PathBuf>,
    /// Users registry merged into each snapshot.
    users: UsersStore,
    /// Snapshot in effect.
    current: Arc<ConfigSnapshot>,
    /// Control sender kept for handles.
    control_tx: mpsc::Sender<ControlMessage>,
    /// Control receiver.
    control_rx: mpsc::Receiver<ControlMessage>,
    /// Shutdown flag.
    shutdown: Arc<watch::Sender<bool>>,
    /// Snapshot feed for readers.
    snapshot_tx: watch::Sender<Arc<ConfigSnapshot>>,
    /// Components that follow config reloads.
    targets: Vec<Arc<dyn Reconfigure>>,
}

impl<E> Monitor<E>
where
    E: QueryExecutor + 'static,
    E::Context: 'static,
{
    /// Creates a monitor starting from `snapshot`.
    #[must_use]
    pub fn new(
        deps: CycleDeps<E>,
        snapshot: ConfigSnapshot,
        config_path: Option<PathBuf>,
        users: UsersStore,
    ) -> Self {
        let current = Arc::new(snapshot);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let (snapshot_tx, _) = watch::channel(Arc::clone(&current));
        Self {
            deps,
            config_path,
            users,
            current,
            control_tx,
            control_rx,
            shutdown: Arc::new(shutdown),
            snapshot_tx,
            targets: Vec::new(),
        }
    }

    /// Registers a component that adopts new settings on reload.
    #[must_use]
    pub fn with_reconfigure(mut self, target: Arc<dyn Reconfigure>) -> Self {
        self.targets.push(target);
        self
    }

    /// Returns a handle for the watcher, signal listener, and API.
    #[must_use]
    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            control: self.control_tx.clone(),
            shutdown: Arc::clone(&self.shutdown),
            snapshots: self.snapshot_tx.subscribe(),
        }
    }

    /// Returns the snapshot in effect.
    #[must_use]
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        Arc::clone(&self.current)
    }

    /// Runs a single cycle.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Store`] when state cannot be persisted.
    pub async fn run_once(&self) -> Result<CycleOutcome, RuntimeError> {
        run_cycle(&self.deps, &self.current, self.shutdown.subscribe()).await
    }

    /// Runs cycles until shutdown.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Store`] when state cannot be persisted.
    pub async fn run(mut self) -> Result<(), RuntimeError> {
        self.deps.events.record(
            &MonitorEvent::new(events::MONITOR_STARTED)
                .with("tracked", self.current.tracked.len())
                .with("workers", self.current.config.scheduler.workers)
                .with(
                    "config",
                    self.config_path
                        .as_ref()
                        .map(|path| path.display().to_string())
                        .unwrap_or_default(),
                ),
        );
        let mut shutdown_rx = self.shutdown.subscribe();
        loop {
            let outcome = run_cycle(&self.deps, &self.current, self.shutdown.subscribe()).await?;
            if outcome.report.cancelled || *shutdown_rx.borrow() {
                break;
            }
            let scheduler = &self.current.config.scheduler;
            let wait = next_wait(
                &self.current.tracked,
                &outcome.items,
                scheduler.default_freq_minutes,
                scheduler.poll_interval(),
                self.deps.clock.now(),
            );
            tokio::select! {
                () = sleep(wait) => {}
                () = cancelled(&mut shutdown_rx) => break,
                message = self.control_rx.recv() => match message {
                    Some(ControlMessage::Reload) => self.reload(),
                    Some(ControlMessage::CheckNow) => self.refresh_users(),
                    Some(ControlMessage::Shutdown) | None => break,
                },
            }
        }
        Ok(())
    }

    /// Re-reads the config file and user codes.
    ///
    /// On failure the current snapshot stays in effect.
    pub fn reload(&mut self) {
        let staged = MonitorConfig::load(self.config_path.as_deref())
            .map_err(RuntimeError::from)
            .and_then(|config| build_snapshot(config, &self.users, self.deps.events.as_ref()))
            .and_then(|snapshot| {
                let changes = self.stage_targets(&snapshot.config)?;
                Ok((snapshot, changes))
            });
        match staged {
            Ok((snapshot, changes)) => {
                let previous = Arc::clone(&self.current);
                let mut reconfigured = Vec::with_capacity(changes.len());
                for (name, change) in changes {
                    change();
                    reconfigured.push(name);
                }
                self.follow_storage(&previous.config, &snapshot.config);
                let restart = restart_required(&previous.config, &snapshot.config);
                self.swap(snapshot);
                self.deps.events.record(
                    &MonitorEvent::new(events::CONFIG_RELOADED)
                        .with("tracked", self.current.tracked.len())
                        .with("reconfigured", reconfigured),
                );
                if !restart.is_empty() {
                    self.deps.events.record(
                        &MonitorEvent::new(events::CONFIG_RESTART_REQUIRED)
                            .with("fields", restart),
                    );
                }
            }
            Err(err) => self.deps.events.record(
                &MonitorEvent::new(events::CONFIG_RELOAD_REJECTED)
                    .with("error", err.to_string())
                    .with("kept_tracked", self.current.tracked.len()),
            ),
        }
    }

    /// Stages every target against `next`, failing on the first refusal.
    fn stage_targets(
        &self,
        next: &MonitorConfig,
    ) -> Result<Vec<(&'static str, StagedChange)>, RuntimeError> {
        let mut staged = Vec::new();
        for target in &self.targets {
            if let Some(change) = target.stage(&self.current.config, next)? {
                staged.push((target.name(), change));
            }
        }
        Ok(staged)
    }

    /// Points the failure export at the new log directory.
    fn follow_storage(&mut self, previous: &MonitorConfig, next: &MonitorConfig) {
        let moved = previous.storage.fails_dir() != next.storage.fails_dir();
        if moved && self.deps.failures.is_some() {
            self.deps.failures = Some(FailureLog::new(next.storage.fails_dir()));
        }
    }

    /// Re-merges user codes into the current config.
    pub fn refresh_users(&mut self) {
        match build_snapshot(self.current.config.clone(), &self.users, self.deps.events.as_ref()) {
            Ok(snapshot) => self.swap(snapshot),
            Err(err) => self.deps.events.record(
                &MonitorEvent::new(events::CONFIG_RELOAD_REJECTED)
                    .with("error", err.to_string())
                    .with("kept_tracked", self.current.tracked.len()),
            ),
        }
    }

    /// Installs `snapshot`, logging the tracked-set diff.
    fn swap(&mut self, snapshot: ConfigSnapshot) {
        let diff = diff_tracked(&self.current.tracked, &snapshot.tracked);
        if !diff.is_empty() {
            let list = |codes: &[QueryCode]| -> Vec<String> {
                codes.iter().map(ToString::to_string).collect()
            };
            let modified: Vec<String> = diff
                .modified
                .iter()
                .map(|change| format!("{}:{}", change.code, change.fields.join("+")))
                .collect();
            self.deps.events.record(
                &MonitorEvent::new(events::CONFIG_DIFF)
                    .with("added", list(&diff.added))
                    .with("removed", list(&diff.removed))
                    .with("modified", modified),
            );
        }
        self.current = Arc::new(snapshot);
        self.snapshot_tx.send_replace(Arc::clone(&self.current));
    }
}

// ============================================================================
// SECTION: Background Tasks
// ============================================================================

/// Polls the config file's mtime and requests a reload on change.
#[must_use]
pub fn spawn_config_watcher(
    path: PathBuf,
    initial: Option<SystemTime>,
    handle: MonitorHandle,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last_seen = initial;
        loop {
            sleep(interval).await;
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            let modified = metadata.modified().ok();
            if modified.is_some() && modified != last_seen {
                last_seen = modified;
                if !handle.send(ControlMessage::Reload).await {
                    break;
                }
            }
        }
    })
}

/// Maps SIGHUP to reload and SIGTERM/SIGINT to shutdown.
#[cfg(unix)]
#[must_use]
pub fn spawn_signal_listener(
    handle: MonitorHandle,
    sink: Arc<dyn MonitorEventSink>,
) -> JoinHandle<()> {
    use tokio::signal::unix::SignalKind;
    use tokio::signal::unix::signal;

    tokio::spawn(async move {
        let (Ok(mut hangup), Ok(mut terminate), Ok(mut interrupt)) = (
            signal(SignalKind::hangup()),
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) else {
            return;
        };
        loop {
            let name = tokio::select! {
                _ = hangup.recv() => {
                    if handle.send(ControlMessage::Reload).await {
                        continue;
                    }
                    break;
                }
                _ = terminate.recv() => "SIGTERM",
                _ = interrupt.recv() => "SIGINT",
            };
            sink.record(&MonitorEvent::new(events::SHUTDOWN_REQUESTED).with("signal", name));
            handle.request_shutdown();
            break;
        }
    })
}

/// Maps Ctrl-C to shutdown.
#[cfg(not(unix))]
#[must_use]
pub fn spawn_signal_listener(
    handle: MonitorHandle,
    sink: Arc<dyn MonitorEventSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            sink.record(&MonitorEvent::new(events::SHUTDOWN_REQUESTED).with("signal", "ctrl_c"));
            handle.request_shutdown();
        }
    })
}
