// crates/visa-monitor-cli/src/main.rs
// ============================================================================
// Module: Visa Monitor CLI Entry Point
// Description: Command dispatcher for monitoring, batch checks, and reports.
// Purpose: Provide a localized CLI over the visa-monitor runtime.
// Dependencies: clap, thiserror, time, tokio, visa-monitor-* crates.
// ============================================================================

//! ## Overview
//! `visa-monitor` wires the runtime crates into operator commands: code
//! generation, one-shot batch checks, the long-running monitor (optionally
//! with the self-service API), systemd lifecycle, and Markdown reports.
//! All user-facing strings are routed through the i18n catalog.
//!
//! Exit codes: `0` success, `1` usage or generic failure, `2` configuration
//! error, `3` storage error, `4` runtime or network error.

// ============================================================================
// SECTION: Modules
// ============================================================================

#[cfg(test)]
mod main_tests;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::ArgAction;
use clap::Args;
use clap::CommandFactory;
use clap::Parser;
use clap::Subcommand;
use clap::ValueEnum;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::oneshot;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use visa_monitor_cli::clean;
use visa_monitor_cli::clean::CleanError;
use visa_monitor_cli::clean::KeepFilter;
use visa_monitor_cli::clean::MonitorFields;
use visa_monitor_cli::clean::StatusKey;
use visa_monitor_cli::codegen;
use visa_monitor_cli::codegen::CodegenOptions;
use visa_monitor_cli::i18n::Locale;
use visa_monitor_cli::i18n::set_locale;
use visa_monitor_cli::report;
use visa_monitor_cli::report::ReportError;
use visa_monitor_cli::systemd::DEFAULT_SERVICE_NAME;
use visa_monitor_cli::systemd::ServiceManager;
use visa_monitor_cli::systemd::SystemCommandRunner;
use visa_monitor_cli::systemd::SystemdError;
use visa_monitor_cli::systemd::UnitSpec;
use visa_monitor_cli::t;
use visa_monitor_config::ConfigError;
use visa_monitor_config::MonitorConfig;
use visa_monitor_config::apply_env_overrides;
use visa_monitor_config::config_toml_example;
use visa_monitor_config::resolve_path;
use visa_monitor_core::MonitorEventSink;
use visa_monitor_core::SnapshotStore;
use visa_monitor_core::events::FanoutEventSink;
use visa_monitor_core::events::FileEventSink;
use visa_monitor_core::events::NoopEventSink;
use visa_monitor_core::events::StderrEventSink;
use visa_monitor_notify::Notifier;
use visa_monitor_notify::NotifierSettings;
use visa_monitor_runtime::ApiSettings;
use visa_monitor_runtime::ApiState;
use visa_monitor_runtime::BatchRunner;
use visa_monitor_runtime::BatchSettings;
use visa_monitor_runtime::Clock;
use visa_monitor_runtime::CycleDeps;
use visa_monitor_runtime::Monitor;
use visa_monitor_runtime::PortalExecutor;
use visa_monitor_runtime::PortalSettings;
use visa_monitor_runtime::RuntimeError;
use visa_monitor_runtime::SystemClock;
use visa_monitor_runtime::load_state;
use visa_monitor_runtime::mail_transport;
use visa_monitor_runtime::monitor::CONFIG_WATCH_INTERVAL;
use visa_monitor_runtime::server;
use visa_monitor_runtime::spawn_config_watcher;
use visa_monitor_runtime::spawn_signal_listener;
use visa_monitor_store::AtomicFile;
use visa_monitor_store::FailureLog;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Environment variable selecting the output language.
const LANG_ENV: &str = "VISA_MONITOR_LANG";
/// Default CSV for `generate-codes`, `check`, and `report`.
const DEFAULT_CODES_CSV: &str = "query_codes.csv";

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Visa status monitor.
#[derive(Parser, Debug)]
#[command(
    name = "visa-monitor",
    about = "Monitor residence-permit application status and notify on change.",
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct Cli {
    /// Print version information and exit.
    #[arg(long = "version", action = ArgAction::SetTrue, global = true)]
    show_version: bool,
    /// Preferred output language (overrides `VISA_MONITOR_LANG`).
    #[arg(long, value_enum, value_name = "LANG", global = true)]
    lang: Option<LangArg>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate sequential query codes into a CSV.
    #[command(name = "generate-codes", visible_aliases = ["gen", "gc"])]
    GenerateCodes(GenerateCodesCommand),
    /// Query every unanswered row of a CSV once.
    Check(CheckCommand),
    /// Run the monitor or manage its systemd service.
    Monitor {
        /// Selected monitor subcommand.
        #[command(subcommand)]
        command: MonitorCommand,
    },
    /// Summarize a checked CSV into a Markdown report.
    Report(ReportCommand),
    /// Turn a checked CSV into `[[codes]]` entries for the monitor.
    #[command(visible_alias = "cl")]
    Clean(CleanCommand),
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// Supported CLI language selections.
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
enum LangArg {
    /// English.
    En,
    /// Simplified Chinese.
    Zh,
}

impl From<LangArg> for Locale {
    fn from(value: LangArg) -> Self {
        match value {
            LangArg::En => Self::En,
            LangArg::Zh => Self::Zh,
        }
    }
}

/// Arguments for `generate-codes`.
#[derive(Args, Debug)]
struct GenerateCodesCommand {
    /// Output CSV path.
    #[arg(short = 'o', long, value_name = "PATH", default_value = DEFAULT_CODES_CSV)]
    output: PathBuf,
    /// First day (YYYY-MM-DD); defaults to 2025-06-01.
    #[arg(short = 's', long, value_name = "DATE")]
    start: Option<String>,
    /// Last day (YYYY-MM-DD); defaults to today.
    #[arg(short = 'e', long, value_name = "DATE")]
    end: Option<String>,
    /// Codes per day.
    #[arg(short = 'n', long, value_name = "N", default_value_t = codegen::DEFAULT_PER_DAY)]
    per_day: u32,
    /// Include Saturdays and Sundays.
    #[arg(short = 'w', long, action = ArgAction::SetTrue)]
    include_weekends: bool,
    /// Weekday digits to skip (1 = Monday .. 7 = Sunday), e.g. `35`.
    #[arg(short = 'x', long, value_name = "DIGITS")]
    exclude_weekdays: Option<String>,
    /// Code prefix.
    #[arg(short = 'p', long, value_name = "PREFIX", default_value = codegen::DEFAULT_PREFIX)]
    prefix: String,
}

/// Arguments for `check`.
#[derive(Args, Debug)]
struct CheckCommand {
    /// CSV with a code column; answered rows are skipped.
    #[arg(short = 'i', long, value_name = "PATH", default_value = DEFAULT_CODES_CSV)]
    input: PathBuf,
    /// Concurrent portal sessions.
    #[arg(short = 'w', long, value_name = "N")]
    workers: Option<usize>,
    /// Attempts per code.
    #[arg(short = 'r', long, value_name = "N")]
    retries: Option<u32>,
    /// Config file supplying portal settings.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

/// Monitor subcommands.
#[derive(Subcommand, Debug)]
enum MonitorCommand {
    /// Run the monitor in the foreground.
    Run(RunCommand),
    /// Write the systemd unit, then enable and start it.
    Install(InstallCommand),
    /// Stop, disable, and remove the systemd unit.
    Uninstall(ServiceArgs),
    /// Start the service.
    Start(ServiceArgs),
    /// Stop the service.
    Stop(ServiceArgs),
    /// Reload the service configuration.
    Reload(ServiceArgs),
    /// Show service status and recent logs.
    Status(ServiceArgs),
}

/// Arguments for `monitor run`.
#[derive(Args, Debug)]
struct RunCommand {
    /// Config file path.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Run a single cycle and exit.
    #[arg(long, action = ArgAction::SetTrue)]
    once: bool,
}

/// Service selection shared by systemd subcommands.
#[derive(Args, Debug)]
struct ServiceArgs {
    /// systemd service name.
    #[arg(long, value_name = "NAME", default_value = DEFAULT_SERVICE_NAME)]
    name: String,
}

/// Arguments for `monitor install`.
#[derive(Args, Debug)]
struct InstallCommand {
    /// Service selection.
    #[command(flatten)]
    service: ServiceArgs,
    /// Config file the service runs with.
    #[arg(long, value_name = "PATH", default_value = visa_monitor_config::DEFAULT_CONFIG_NAME)]
    config: PathBuf,
}

/// Arguments for `report`.
#[derive(Args, Debug)]
struct ReportCommand {
    /// Checked CSV.
    #[arg(short = 'i', long, value_name = "PATH", default_value = DEFAULT_CODES_CSV)]
    input: PathBuf,
    /// Markdown output; defaults to `reports/{date}/{time}/summary.md`.
    #[arg(short = 'o', long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Also write the summary as JSON.
    #[arg(long, value_name = "PATH")]
    json: Option<PathBuf>,
}

/// Arguments for `clean`.
#[derive(Args, Debug)]
struct CleanCommand {
    /// Checked CSV.
    #[arg(short = 'i', long, value_name = "PATH", default_value = DEFAULT_CODES_CSV)]
    input: PathBuf,
    /// TOML output; defaults to `{input}_cleaned_{timestamp}.toml` beside the input.
    #[arg(short = 'o', long, value_name = "PATH")]
    output: Option<PathBuf>,
    /// Statuses to keep as letters from n, g, p, r; drops only Not Found when absent.
    #[arg(short = 'k', long, value_name = "LETTERS")]
    keep: Option<String>,
    /// Monitor fields for every code, e.g. `t:you@example.com,f:60`.
    #[arg(short = 'm', long = "for-monitor", visible_alias = "fm", value_name = "FIELDS")]
    for_monitor: Option<String>,
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the config, including user codes.
    Validate {
        /// Config file path.
        #[arg(long, value_name = "PATH")]
        config: Option<PathBuf>,
    },
    /// Print an example config.
    Example,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Exit-code category of a failure.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum ErrorKind {
    /// Bad arguments or an unclassified failure.
    Usage,
    /// Configuration could not be loaded or validated.
    Config,
    /// Persisted state could not be read or written.
    Store,
    /// Portal, SMTP, server, or service manager failure.
    Runtime,
}

impl ErrorKind {
    /// Returns the process exit code.
    const fn code(self) -> u8 {
        match self {
            Self::Usage => 1,
            Self::Config => 2,
            Self::Store => 3,
            Self::Runtime => 4,
        }
    }
}

/// CLI error wrapper for localized error messages.
#[derive(Debug, Error)]
#[error("{message}")]
struct CliError {
    /// Exit-code category.
    kind: ErrorKind,
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a usage error from a localized message.
    const fn new(message: String) -> Self {
        Self::with_kind(ErrorKind::Usage, message)
    }

    /// Constructs an error in a specific category.
    const fn with_kind(kind: ErrorKind, message: String) -> Self {
        Self {
            kind,
            message,
        }
    }
}

/// CLI result alias for fallible operations.
type CliResult<T> = Result<T, CliError>;

/// Maps a config error to exit code 2.
fn config_error(err: &ConfigError) -> CliError {
    CliError::with_kind(ErrorKind::Config, t!("config.load_failed", error = err))
}

/// Maps a runtime error to its exit-code category.
fn runtime_error(err: &RuntimeError) -> CliError {
    match err {
        RuntimeError::Config(_) => {
            CliError::with_kind(ErrorKind::Config, t!("config.load_failed", error = err))
        }
        RuntimeError::Store(_) => {
            CliError::with_kind(ErrorKind::Store, t!("monitor.store_failed", error = err))
        }
        RuntimeError::Server(_) | RuntimeError::Execution(_) => {
            CliError::with_kind(ErrorKind::Runtime, t!("monitor.runtime_failed", error = err))
        }
    }
}

/// Maps a service manager error to its exit-code category.
fn systemd_error(err: &SystemdError) -> CliError {
    let kind = match err {
        SystemdError::InvalidName(_) => ErrorKind::Usage,
        SystemdError::Io {
            ..
        } => ErrorKind::Store,
        SystemdError::Command {
            ..
        } => ErrorKind::Runtime,
    };
    let message = match err {
        SystemdError::Io {
            path,
            error,
        } => t!("systemd.unit_write_failed", path = path, error = error),
        SystemdError::Command {
            command,
            error,
        } => t!("systemd.command_failed", command = command, error = error),
        SystemdError::InvalidName(_) => err.to_string(),
    };
    CliError::with_kind(kind, message)
}

/// Maps a report error to its exit-code category.
fn report_error(err: &ReportError) -> CliError {
    match err {
        ReportError::Io {
            path,
            error,
        } => CliError::with_kind(
            ErrorKind::Store,
            t!("report.write_failed", path = path, error = error),
        ),
        ReportError::Empty
        | ReportError::MissingStatusColumn(_)
        | ReportError::Serialization(_) => CliError::new(t!("report.failed", error = err)),
    }
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(err) => emit_error(&err),
    }
}

/// Executes the CLI command dispatcher.
async fn run() -> CliResult<ExitCode> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            if err.use_stderr() {
                return Ok(ExitCode::from(ErrorKind::Usage.code()));
            }
            return Ok(ExitCode::SUCCESS);
        }
    };
    let env_lang = std::env::var(LANG_ENV).ok();
    let locale = resolve_locale(cli.lang, env_lang.as_deref())?;
    set_locale(locale);

    if cli.show_version {
        let version = env!("CARGO_PKG_VERSION");
        write_stdout_line(&t!("main.version", version = version))
            .map_err(|err| CliError::new(output_error("stdout", &err)))?;
        return Ok(ExitCode::SUCCESS);
    }

    let Some(command) = cli.command else {
        show_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match command {
        Commands::GenerateCodes(command) => command_generate_codes(&command),
        Commands::Check(command) => command_check(command).await,
        Commands::Monitor {
            command,
        } => command_monitor(command).await,
        Commands::Report(command) => command_report(&command),
        Commands::Clean(command) => command_clean(&command),
        Commands::Config {
            command,
        } => command_config(command),
    }
}

/// Prints top-level help.
fn show_help() -> CliResult<()> {
    let mut command = Cli::command();
    command.print_help().map_err(|err| CliError::new(output_error("stdout", &err)))?;
    write_stdout_line("").map_err(|err| CliError::new(output_error("stdout", &err)))?;
    Ok(())
}

// ============================================================================
// SECTION: Code Generation
// ============================================================================

/// Writes generated codes to the output CSV.
fn command_generate_codes(command: &GenerateCodesCommand) -> CliResult<ExitCode> {
    let options = codegen_options(command, OffsetDateTime::now_utc().date())?;
    let rows = codegen::generate_codes(&options)
        .map_err(|err| CliError::new(t!("codegen.failed", error = err)))?;
    let csv = codegen::render_csv(&rows);
    AtomicFile::new(&command.output)
        .and_then(|file| file.replace(csv.as_bytes()))
        .map_err(|err| {
            CliError::with_kind(
                ErrorKind::Store,
                t!("codegen.write_failed", path = command.output.display(), error = err),
            )
        })?;
    stdout_line(&t!("codegen.ok", count = rows.len(), path = command.output.display()))?;
    Ok(ExitCode::SUCCESS)
}

/// Builds generation options from flags, defaulting the end to `today`.
fn codegen_options(command: &GenerateCodesCommand, today: time::Date) -> CliResult<CodegenOptions> {
    let end = match command.end.as_deref() {
        Some(value) => parse_cli_date("end", value)?,
        None => today,
    };
    let mut options = CodegenOptions::new(end);
    if let Some(value) = command.start.as_deref() {
        options.start = parse_cli_date("start", value)?;
    }
    options.prefix.clone_from(&command.prefix);
    options.per_day = command.per_day;
    options.include_weekends = command.include_weekends;
    if let Some(value) = command.exclude_weekdays.as_deref() {
        options.excluded_weekdays = codegen::parse_excluded_weekdays(value)
            .map_err(|err| CliError::new(t!("codegen.failed", error = err)))?;
    }
    Ok(options)
}

/// Parses a date flag.
fn parse_cli_date(field: &str, value: &str) -> CliResult<time::Date> {
    codegen::parse_date(value)
        .map_err(|_| CliError::new(t!("codegen.invalid_date", field = field, value = value)))
}

// ============================================================================
// SECTION: Batch Check
// ============================================================================

/// Runs one batch over the input CSV.
async fn command_check(command: CheckCommand) -> CliResult<ExitCode> {
    if let Err(err) = std::fs::metadata(&command.input) {
        return Err(CliError::new(t!(
            "check.read_failed",
            path = command.input.display(),
            error = err
        )));
    }
    let config = load_batch_config(command.config.as_deref())?;
    let events = open_event_sink(&config.storage.log_path(), "batch")?;
    let settings = PortalSettings::from_config(&config.portal).map_err(|err| runtime_error(&err))?;
    let runner = BatchRunner::new(
        Arc::new(PortalExecutor::new(settings)),
        &config.storage.fails_dir(),
        events,
        Arc::new(SystemClock),
    )
    .map_err(|err| runtime_error(&err))?;
    let dispatch = BatchSettings {
        workers: command.workers,
        retries: command.retries,
    }
    .dispatch(&config);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel_tx.send_replace(true);
        }
    });
    let result = runner.run(&command.input, dispatch, cancel_rx).await;
    interrupt.abort();
    let report = result.map_err(|err| match err {
        RuntimeError::Store(_) => {
            CliError::with_kind(ErrorKind::Store, t!("check.failed", error = err))
        }
        other => runtime_error(&other),
    })?;

    stdout_line(&t!(
        "check.summary",
        checked = report.checked,
        rows = report.rows,
        skipped = report.skipped,
        failures = report.failures,
        written = report.written,
        path = command.input.display()
    ))?;
    for (status, count) in &report.by_status {
        stdout_line(&t!("check.status_line", status = status.label(), count = count))?;
    }
    if let Some(path) = &report.fails_path {
        stdout_line(&t!("check.fails_written", path = path.display()))?;
    }
    if report.cancelled {
        stderr_line(&t!("check.cancelled"))?;
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Loads the config for a batch run.
///
/// Without `--config` and without a config file on disk, defaults plus
/// environment overrides are used so `check` works standalone.
fn load_batch_config(path: Option<&Path>) -> CliResult<MonitorConfig> {
    if path.is_some() {
        return MonitorConfig::load(path).map_err(|err| config_error(&err));
    }
    let resolved = resolve_path(None).map_err(|err| config_error(&err))?;
    if resolved.exists() {
        return MonitorConfig::load(Some(&resolved)).map_err(|err| config_error(&err));
    }
    let mut config = MonitorConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())
        .map_err(|err| config_error(&err))?;
    config.validate().map_err(|err| config_error(&err))?;
    Ok(config)
}

// ============================================================================
// SECTION: Monitor
// ============================================================================

/// Dispatches monitor subcommands.
async fn command_monitor(command: MonitorCommand) -> CliResult<ExitCode> {
    match command {
        MonitorCommand::Run(command) => command_monitor_run(command).await,
        MonitorCommand::Install(command) => command_service_install(&command),
        MonitorCommand::Uninstall(args) => {
            let manager = service_manager(&args)?;
            manager.uninstall().map_err(|err| systemd_error(&err))?;
            stdout_line(&t!("systemd.uninstalled", name = manager.name()))?;
            Ok(ExitCode::SUCCESS)
        }
        MonitorCommand::Start(args) => service_action(&args, "start", ServiceManager::start),
        MonitorCommand::Stop(args) => service_action(&args, "stop", ServiceManager::stop),
        MonitorCommand::Reload(args) => service_action(&args, "reload", ServiceManager::reload),
        MonitorCommand::Status(args) => command_service_status(&args),
    }
}

/// Runs the monitor until shutdown, or for a single cycle with `--once`.
async fn command_monitor_run(command: RunCommand) -> CliResult<ExitCode> {
    let config_path = resolve_path(command.config.as_deref()).map_err(|err| config_error(&err))?;
    let config = MonitorConfig::load(Some(&config_path)).map_err(|err| config_error(&err))?;
    let events = open_event_sink(&config.storage.log_path(), "monitor")?;
    let state = load_state(Some(&config_path), events.as_ref()).map_err(|err| runtime_error(&err))?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (notifier, notify_worker) = spawn_notifier(&config, Arc::clone(&events))?;
    let portal = PortalSettings::from_config(&config.portal).map_err(|err| runtime_error(&err))?;

    let executor = Arc::new(PortalExecutor::new(portal));
    let status_store: Arc<dyn SnapshotStore> = state.stores.status.clone();
    let deps = CycleDeps {
        executor: Arc::clone(&executor),
        store: status_store,
        notifier: Some(notifier.clone()),
        events: Arc::clone(&events),
        failures: Some(FailureLog::new(config.storage.fails_dir())),
        clock: Arc::clone(&clock),
    };
    let modified = state.snapshot.source_modified_at();
    let monitor =
        Monitor::new(deps, state.snapshot, Some(config_path.clone()), state.stores.users.clone())
            .with_reconfigure(executor)
            .with_reconfigure(Arc::new(notifier.clone()));

    if command.once {
        let result = monitor.run_once().await;
        drop(monitor);
        drop(notifier);
        let _ = notify_worker.await;
        let outcome = result.map_err(|err| runtime_error(&err))?;
        stdout_line(&t!(
            "monitor.once.summary",
            due = outcome.report.due,
            processed = outcome.report.processed,
            failures = outcome.report.failures,
            notifications = outcome.report.notifications
        ))?;
        return Ok(ExitCode::SUCCESS);
    }

    let handle = monitor.handle();
    let watcher =
        spawn_config_watcher(config_path, modified, handle.clone(), CONFIG_WATCH_INTERVAL);
    let signals = spawn_signal_listener(handle.clone(), Arc::clone(&events));
    let api = if config.server.enabled {
        let state = ApiState::new(
            ApiSettings::from_config(&config.server),
            handle,
            state.stores,
            Some(notifier.clone()),
            clock,
            Arc::clone(&events),
        );
        Some(ApiServer::start(&config, state).await?)
    } else {
        None
    };

    let result = monitor.run().await;
    watcher.abort();
    signals.abort();
    let api_result = match api {
        Some(api) => api.stop().await,
        None => Ok(()),
    };
    drop(notifier);
    let _ = notify_worker.await;
    result.map_err(|err| runtime_error(&err))?;
    api_result?;
    Ok(ExitCode::SUCCESS)
}

/// Opens the daily JSONL event log and mirrors events to stderr.
fn open_event_sink(log_dir: &Path, prefix: &str) -> CliResult<Arc<dyn MonitorEventSink>> {
    let file = FileEventSink::daily(log_dir, prefix).map_err(|err| {
        CliError::with_kind(
            ErrorKind::Store,
            t!("monitor.log_failed", path = log_dir.display(), error = err),
        )
    })?;
    let sinks: Vec<Arc<dyn MonitorEventSink>> = vec![Arc::new(file), Arc::new(StderrEventSink)];
    Ok(Arc::new(FanoutEventSink::new(sinks)))
}

/// Starts the notification worker over SMTP, or over a transport that
/// rejects every message when SMTP is not configured.
fn spawn_notifier(
    config: &MonitorConfig,
    events: Arc<dyn MonitorEventSink>,
) -> CliResult<(Notifier, JoinHandle<()>)> {
    let transport = mail_transport(&config.notify).map_err(|err| {
        CliError::with_kind(ErrorKind::Config, t!("monitor.smtp_invalid", error = err))
    })?;
    let settings =
        NotifierSettings::from_config(&config.notify, config.server.public_base_url.clone());
    Ok(Notifier::spawn(transport, settings, events))
}

/// Running self-service API tasks.
struct ApiServer {
    /// Signals graceful shutdown.
    shutdown: oneshot::Sender<()>,
    /// HTTP server task.
    serve: JoinHandle<Result<(), RuntimeError>>,
    /// Expiry sweeper task.
    cleanup: JoinHandle<()>,
}

impl ApiServer {
    /// Binds the configured address and starts serving.
    async fn start(config: &MonitorConfig, state: ApiState) -> CliResult<Self> {
        let addr = config.server.bind_addr().map_err(|err| config_error(&err))?;
        let listener = server::bind(addr).await.map_err(|err| {
            CliError::with_kind(ErrorKind::Runtime, t!("monitor.server_failed", error = err))
        })?;
        stdout_line(&t!("monitor.server.listening", addr = addr))?;
        let state = Arc::new(state);
        let cleanup = server::spawn_cleanup(Arc::clone(&state));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let serve = tokio::spawn(server::serve(state, listener, async move {
            let _ = shutdown_rx.await;
        }));
        Ok(Self {
            shutdown,
            serve,
            cleanup,
        })
    }

    /// Stops the server and waits for in-flight requests.
    async fn stop(self) -> CliResult<()> {
        let _ = self.shutdown.send(());
        self.cleanup.abort();
        let _ = self.cleanup.await;
        match self.serve.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(CliError::with_kind(
                ErrorKind::Runtime,
                t!("monitor.server_failed", error = err),
            )),
            Err(err) => Err(CliError::with_kind(
                ErrorKind::Runtime,
                t!("monitor.server_failed", error = err),
            )),
        }
    }
}

// ============================================================================
// SECTION: Service Management
// ============================================================================

/// Builds a manager for the named service.
fn service_manager(args: &ServiceArgs) -> CliResult<ServiceManager<SystemCommandRunner>> {
    ServiceManager::new(SystemCommandRunner, &args.name).map_err(|err| systemd_error(&err))
}

/// Runs a lifecycle action and reports it.
fn service_action(
    args: &ServiceArgs,
    action: &str,
    op: fn(&ServiceManager<SystemCommandRunner>) -> Result<(), SystemdError>,
) -> CliResult<ExitCode> {
    let manager = service_manager(args)?;
    op(&manager).map_err(|err| systemd_error(&err))?;
    stdout_line(&t!("systemd.action_ok", action = action, name = manager.name()))?;
    Ok(ExitCode::SUCCESS)
}

/// Installs the unit for this executable and config.
fn command_service_install(command: &InstallCommand) -> CliResult<ExitCode> {
    let manager = service_manager(&command.service)?;
    let executable = std::env::current_exe()
        .map_err(|err| CliError::new(t!("systemd.exe_failed", error = err)))?;
    let working_dir = std::env::current_dir()
        .map_err(|err| CliError::new(t!("systemd.exe_failed", error = err)))?;
    let config = std::path::absolute(&command.config).map_err(|err| {
        CliError::with_kind(ErrorKind::Config, t!("config.load_failed", error = err))
    })?;
    let unit = UnitSpec {
        executable,
        config,
        working_dir,
    };
    let path = manager.install(&unit).map_err(|err| systemd_error(&err))?;
    stdout_line(&t!("systemd.installed", path = path.display()))?;
    Ok(ExitCode::SUCCESS)
}

/// Prints `systemctl status` and recent journal lines.
fn command_service_status(args: &ServiceArgs) -> CliResult<ExitCode> {
    let manager = service_manager(args)?;
    let status = manager.status().map_err(|err| systemd_error(&err))?;
    stdout_line(status.status.trim_end())?;
    if let Some(journal) = status.journal {
        stdout_line(&t!("systemd.logs_header"))?;
        stdout_line(journal.trim_end())?;
    }
    Ok(if status.active { ExitCode::SUCCESS } else { ExitCode::from(ErrorKind::Runtime.code()) })
}

// ============================================================================
// SECTION: Report
// ============================================================================

/// Writes the Markdown report, the archived input, and optional JSON.
fn command_report(command: &ReportCommand) -> CliResult<ExitCode> {
    if let Err(err) = std::fs::metadata(&command.input) {
        return Err(CliError::new(t!(
            "report.read_failed",
            path = command.input.display(),
            error = err
        )));
    }
    let now = OffsetDateTime::now_utc();
    let markdown = command.output.clone().unwrap_or_else(|| report::default_markdown_path(now));
    let output = report::write_report(&command.input, &markdown, command.json.as_deref(), now)
        .map_err(|err| report_error(&err))?;
    if let Some(path) = &output.archived_input {
        stdout_line(&t!("report.archived", path = path.display()))?;
    }
    stdout_line(&t!("report.ok", path = output.markdown.display()))?;
    if let Some(path) = &output.json {
        stdout_line(&t!("report.json_ok", path = path.display()))?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Writes the cleaned code list and prints the kept/removed tally.
fn command_clean(command: &CleanCommand) -> CliResult<ExitCode> {
    let keep = command
        .keep
        .as_deref()
        .map(KeepFilter::parse)
        .transpose()
        .map_err(|err| CliError::new(t!("clean.failed", error = err)))?
        .unwrap_or_default();
    let fields = command
        .for_monitor
        .as_deref()
        .map(MonitorFields::parse)
        .transpose()
        .map_err(|err| CliError::new(t!("clean.failed", error = err)))?
        .unwrap_or_default();
    let output = command
        .output
        .clone()
        .unwrap_or_else(|| clean::default_output_path(&command.input, OffsetDateTime::now_utc()));
    let outcome = clean::write_clean(&command.input, &output, &keep, &fields).map_err(|err| {
        match err {
            CleanError::Io {
                path,
                error,
            } => CliError::with_kind(
                ErrorKind::Store,
                t!("clean.io_failed", path = path, error = error),
            ),
            other => CliError::new(t!("clean.failed", error = other)),
        }
    })?;
    stdout_line(&t!(
        "clean.summary",
        total = outcome.total,
        kept = outcome.entries.len(),
        removed = outcome.removed_total(),
        path = output.display()
    ))?;
    match &command.keep {
        Some(letters) => stdout_line(&t!("clean.keep_filter", letters = letters))?,
        None => stdout_line(&t!("clean.keep_default"))?,
    }
    stdout_line(&t!("clean.kept_header"))?;
    print_status_counts(&outcome.kept)?;
    stdout_line(&t!("clean.removed_header"))?;
    print_status_counts(&outcome.removed)?;
    Ok(ExitCode::SUCCESS)
}

/// Prints one line per non-empty status bucket.
fn print_status_counts(counts: &BTreeMap<StatusKey, usize>) -> CliResult<()> {
    for key in StatusKey::ALL {
        if let Some(count) = counts.get(&key) {
            stdout_line(&t!("clean.status_line", status = key, count = count))?;
        }
    }
    Ok(())
}

// ============================================================================
// SECTION: Config
// ============================================================================

/// Dispatches config subcommands.
fn command_config(command: ConfigCommand) -> CliResult<ExitCode> {
    match command {
        ConfigCommand::Validate {
            config,
        } => {
            let state =
                load_state(config.as_deref(), &NoopEventSink).map_err(|err| runtime_error(&err))?;
            let path = state
                .snapshot
                .config
                .source_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_default();
            let codes = state.snapshot.tracked.len();
            stdout_line(&t!("config.validate.ok", codes = codes, path = path))?;
            Ok(ExitCode::SUCCESS)
        }
        ConfigCommand::Example => {
            stdout_line(config_toml_example().trim_end())?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

// ============================================================================
// SECTION: Locale
// ============================================================================

/// Resolves the locale from the flag, then the environment.
fn resolve_locale(lang: Option<LangArg>, env_lang: Option<&str>) -> CliResult<Locale> {
    if let Some(lang) = lang {
        return Ok(lang.into());
    }
    if let Some(value) = env_lang {
        return Locale::parse(value).ok_or_else(|| {
            CliError::new(t!("i18n.lang.invalid_env", env = LANG_ENV, value = value))
        });
    }
    Ok(Locale::En)
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes a line to stdout.
fn write_stdout_line(message: &str) -> std::io::Result<()> {
    let mut stdout = std::io::stdout();
    writeln!(&mut stdout, "{message}")
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Writes a line to stdout, mapping failures to a [`CliError`].
fn stdout_line(message: &str) -> CliResult<()> {
    write_stdout_line(message).map_err(|err| CliError::new(output_error("stdout", &err)))
}

/// Writes a line to stderr, mapping failures to a [`CliError`].
fn stderr_line(message: &str) -> CliResult<()> {
    write_stderr_line(message).map_err(|err| CliError::new(output_error("stderr", &err)))
}

/// Formats a localized output error message.
fn output_error(stream: &str, error: &std::io::Error) -> String {
    let stream_label = match stream {
        "stdout" => t!("output.stream.stdout"),
        "stderr" => t!("output.stream.stderr"),
        _ => t!("output.stream.unknown"),
    };
    t!("output.write_failed", stream = stream_label, error = error)
}

/// Emits an error message to stderr and returns its exit code.
fn emit_error(err: &CliError) -> ExitCode {
    let _ = write_stderr_line(&err.message);
    ExitCode::from(err.kind.code())
}
