// crates/visa-monitor-runtime/src/dispatcher.rs
// ============================================================================
// Module: Concurrency Dispatcher
// Description: Bounded, cancellable fan-out of portal checks for one cycle.
// Purpose: Gate navigation and form submission independently.
// Dependencies: visa-monitor-core, tokio, rand
// ============================================================================

//! ## Overview
//! One execution context is opened per cycle and shared by every check.
//! Each check takes a navigation permit for the page load and a separate
//! fill permit for the submission, with a random pause in between. Retries
//! follow the central [`RetryPolicy`]; only the terminal reading leaves this
//! module.
//!
//! ## Invariants
//! - At most `nav_cap` navigations and `workers` submissions run at once.
//! - The context is closed before [`ConcurrencyDispatcher::run`] returns,
//!   including after cancellation; stuck checks are aborted after the grace
//!   period.
//! - Readings are sent as soon as each check finishes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::Semaphore;
use tokio::sync::mpsc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio::time::timeout;
use visa_monitor_config::MonitorConfig;
use visa_monitor_core::ExecutionError;
use visa_monitor_core::NormalizedStatus;
use visa_monitor_core::QueryCode;
use visa_monitor_core::QueryExecutor;
use visa_monitor_core::RawStatusText;
use visa_monitor_core::RetryPolicy;
use visa_monitor_core::TrackedCode;
use visa_monitor_core::normalize;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Dispatcher limits and pacing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchSettings {
    /// Concurrent submissions.
    pub workers: usize,
    /// Concurrent navigations.
    pub nav_cap: usize,
    /// Lower bound of the pre-submission pause.
    pub jitter_min: Duration,
    /// Upper bound of the pre-submission pause.
    pub jitter_max: Duration,
    /// Retry policy applied per check.
    pub retry: RetryPolicy,
    /// Time allowed for checks to stop after cancellation.
    pub cancel_grace: Duration,
}

impl DispatchSettings {
    /// Builds settings from the validated config.
    #[must_use]
    pub fn from_config(config: &MonitorConfig) -> Self {
        let scheduler = &config.scheduler;
        Self {
            workers: scheduler.workers.max(1),
            nav_cap: scheduler.effective_nav_cap().max(1),
            jitter_min: Duration::from_millis(scheduler.jitter_min_ms),
            jitter_max: Duration::from_millis(scheduler.jitter_max_ms),
            retry: config.retry.policy(),
            cancel_grace: Duration::from_secs(scheduler.cancel_grace_secs),
        }
    }
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            workers: 1,
            nav_cap: 1,
            jitter_min: Duration::from_millis(10),
            jitter_max: Duration::from_millis(60),
            retry: RetryPolicy::default(),
            cancel_grace: Duration::from_secs(10),
        }
    }
}

/// Terminal result of one check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckReading {
    /// Checked code.
    pub code: QueryCode,
    /// Normalized reading; `QueryFailed` after the retry budget.
    pub status: NormalizedStatus,
    /// Raw result text of the successful attempt.
    pub raw: Option<String>,
    /// Last error when the check failed.
    pub error: Option<String>,
    /// Attempts made.
    pub attempts: u32,
}

impl CheckReading {
    /// Builds a failed reading.
    #[must_use]
    pub fn failed(code: QueryCode, error: String, attempts: u32) -> Self {
        Self {
            code,
            status: NormalizedStatus::QueryFailed,
            raw: None,
            error: Some(error),
            attempts,
        }
    }
}

/// Summary of one dispatch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// Checks started.
    pub dispatched: usize,
    /// True when cancellation cut the dispatch short.
    pub cancelled: bool,
    /// Checks aborted after the grace period.
    pub aborted: usize,
}

/// Navigation and submission permits.
struct Gates {
    /// Navigation permits.
    nav: Semaphore,
    /// Submission permits.
    fill: Semaphore,
}

// ============================================================================
// SECTION: Dispatcher
// ============================================================================

/// Runs one cycle's checks against an executor.
pub struct ConcurrencyDispatcher<E: QueryExecutor> {
    /// Portal executor.
    executor: Arc<E>,
    /// Limits and pacing.
    settings: DispatchSettings,
}

impl<E> ConcurrencyDispatcher<E>
where
    E: QueryExecutor + 'static,
    E::Context: 'static,
{
    /// Creates a dispatcher.
    #[must_use]
    pub const fn new(executor: Arc<E>, settings: DispatchSettings) -> Self {
        Self {
            executor,
            settings,
        }
    }

    /// Checks every code in `codes`, sending each reading to `results`.
    ///
    /// A context that cannot be opened yields a failed reading per code.
    pub async fn run(
        &self,
        codes: Vec<TrackedCode>,
        results: mpsc::Sender<CheckReading>,
        mut cancel: watch::Receiver<bool>,
    ) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        if codes.is_empty() {
            return summary;
        }
        let context = match self.executor.open_context().await {
            Ok(context) => Arc::new(context),
            Err(err) => {
                for tracked in codes {
                    let reading = CheckReading::failed(tracked.code, err.to_string(), 0);
                    if results.send(reading).await.is_err() {
                        break;
                    }
                }
                return summary;
            }
        };
        let gates = Arc::new(Gates {
            nav: Semaphore::new(self.settings.nav_cap.max(1)),
            fill: Semaphore::new(self.settings.workers.max(1)),
        });

        let mut tasks = JoinSet::new();
        for tracked in codes {
            let executor = Arc::clone(&self.executor);
            let context = Arc::clone(&context);
            let gates = Arc::clone(&gates);
            let settings = self.settings.clone();
            let results = results.clone();
            let mut cancel = cancel.clone();
            tasks.spawn(async move {
                let checked =
                    check_code(&*executor, &context, &tracked, &gates, &settings, &mut cancel);
                if let Ok(reading) = checked.await {
                    let _ = results.send(reading).await;
                }
            });
            summary.dispatched += 1;
        }
        drop(results);

        loop {
            tokio::select! {
                joined = tasks.join_next() => {
                    if joined.is_none() {
                        break;
                    }
                }
                () = cancelled(&mut cancel) => {
                    summary.cancelled = true;
                    break;
                }
            }
        }
        if summary.cancelled {
            let drained = timeout(self.settings.cancel_grace, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;
            if drained.is_err() {
                summary.aborted = tasks.len();
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
            }
        }

        drop(gates);
        if let Ok(context) = Arc::try_unwrap(context) {
            self.executor.close_context(context).await;
        }
        summary
    }
}

// ============================================================================
// SECTION: Check
// ============================================================================

/// Runs one code through the retry budget.
///
/// Returns `Err(ExecutionError::Cancelled)` when cancelled; the reading is
/// then discarded rather than recorded as a failure.
async fn check_code<E: QueryExecutor>(
    executor: &E,
    context: &E::Context,
    tracked: &TrackedCode,
    gates: &Gates,
    settings: &DispatchSettings,
    cancel: &mut watch::Receiver<bool>,
) -> Result<CheckReading, ExecutionError> {
    let attempts = settings.retry.attempts();
    let mut last_error = String::new();
    for attempt in 1 ..= attempts {
        let outcome = tokio::select! {
            biased;
            () = cancelled(cancel) => Err(ExecutionError::Cancelled),
            outcome = attempt_once(executor, context, tracked, gates, settings) => outcome,
        };
        match outcome {
            Ok(raw) => {
                return Ok(CheckReading {
                    code: tracked.code.clone(),
                    status: normalize(raw.as_str()),
                    raw: Some(raw.0),
                    error: None,
                    attempts: attempt,
                });
            }
            Err(ExecutionError::Cancelled) => return Err(ExecutionError::Cancelled),
            Err(err) => {
                last_error = err.to_string();
                if settings.retry.should_retry(attempt) {
                    let sample = jitter_sample(Duration::ZERO, settings.retry.jitter);
                    let delay = settings.retry.delay_for(attempt, sample);
                    tokio::select! {
                        biased;
                        () = cancelled(cancel) => return Err(ExecutionError::Cancelled),
                        () = sleep(delay) => {}
                    }
                }
            }
        }
    }
    Ok(CheckReading::failed(tracked.code.clone(), last_error, attempts))
}

/// Runs the two gated phases once.
async fn attempt_once<E: QueryExecutor>(
    executor: &E,
    context: &E::Context,
    tracked: &TrackedCode,
    gates: &Gates,
    settings: &DispatchSettings,
) -> Result<RawStatusText, ExecutionError> {
    let page = {
        let _permit = gates.nav.acquire().await.map_err(|_| ExecutionError::Cancelled)?;
        executor.navigate(context, tracked.query_type).await?
    };
    sleep(jitter_sample(settings.jitter_min, settings.jitter_max)).await;
    let _permit = gates.fill.acquire().await.map_err(|_| ExecutionError::Cancelled)?;
    executor.fill_and_read(context, page, &tracked.code).await
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Resolves once the cancellation flag is set; never if the sender is gone.
pub async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        if *cancel.borrow_and_update() {
            return;
        }
        if cancel.changed().await.is_err() {
            pending::<()>().await;
        }
    }
}

/// Samples a pause uniformly from `min..=max`.
fn jitter_sample(min: Duration, max: Duration) -> Duration {
    let low = u64::try_from(min.as_millis()).unwrap_or(u64::MAX);
    let high = u64::try_from(max.as_millis()).unwrap_or(u64::MAX);
    if high <= low {
        return Duration::from_millis(low);
    }
    Duration::from_millis(rand::thread_rng().gen_range(low ..= high))
}
