// crates/visa-monitor-cli/src/systemd.rs
// ============================================================================
// Module: Systemd Service Management
// Description: Unit file rendering and systemctl/journalctl lifecycle calls.
// Purpose: Back the `monitor install|uninstall|start|stop|reload|status` commands.
// Dependencies: thiserror, std::process
// ============================================================================

//! ## Overview
//! [`ServiceManager`] writes `/etc/systemd/system/{name}.service` and drives
//! the unit through `systemctl`. Commands go through [`CommandRunner`] so the
//! lifecycle can be exercised without a running systemd.
//!
//! ## Invariants
//! - Service names are restricted to unit-name characters; they never
//!   contain path separators.
//! - `reload` maps to `reload-or-restart`; the unit's `ExecReload` sends
//!   SIGHUP, which the daemon treats as a config reload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs;
use std::path::Path;
use std::path::PathBuf;
use std::process::Command;

use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default unit name.
pub const DEFAULT_SERVICE_NAME: &str = "cz-visa-monitor";
/// Directory for administrator-installed units.
pub const UNIT_DIR: &str = "/etc/systemd/system";
/// Journal lines shown by `status`.
pub const JOURNAL_LINES: &str = "80";

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Service management errors.
#[derive(Debug, Error)]
pub enum SystemdError {
    /// Service name contains characters outside a unit name.
    #[error("invalid service name: {0}")]
    InvalidName(String),
    /// Unit file could not be written or removed.
    #[error("{path}: {error}")]
    Io {
        /// Unit file path.
        path: String,
        /// Underlying error.
        error: String,
    },
    /// A command could not run or exited unsuccessfully.
    #[error("{command}: {error}")]
    Command {
        /// Command line.
        command: String,
        /// Failure detail.
        error: String,
    },
}

// ============================================================================
// SECTION: Command Execution
// ============================================================================

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// True when the command exited with status zero.
    pub success: bool,
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
}

/// Runs external commands.
pub trait CommandRunner {
    /// Runs `program` with `args` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError::Command`] when the program cannot be started.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, SystemdError>;
}

/// Runs commands with [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandRunner;

impl CommandRunner for SystemCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput, SystemdError> {
        let output = Command::new(program).args(args).output().map_err(|err| {
            SystemdError::Command {
                command: command_line(program, args),
                error: err.to_string(),
            }
        })?;
        Ok(CommandOutput {
            success: output.status.success(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

/// Joins a program and its arguments for messages.
fn command_line(program: &str, args: &[&str]) -> String {
    std::iter::once(program).chain(args.iter().copied()).collect::<Vec<_>>().join(" ")
}

// ============================================================================
// SECTION: Unit File
// ============================================================================

/// Inputs for the unit file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitSpec {
    /// `visa-monitor` executable.
    pub executable: PathBuf,
    /// Config file passed to `monitor run`.
    pub config: PathBuf,
    /// Working directory for relative storage paths.
    pub working_dir: PathBuf,
}

/// Renders the unit file for `name`.
#[must_use]
pub fn unit_text(name: &str, unit: &UnitSpec) -> String {
    format!(
        "[Unit]\n\
         Description=CZ Visa Monitor\n\
         After=network-online.target\n\
         Wants=network-online.target\n\
         \n\
         [Service]\n\
         Type=simple\n\
         WorkingDirectory={working_dir}\n\
         ExecStart={executable} monitor run --config {config}\n\
         ExecReload=/bin/kill -HUP $MAINPID\n\
         Restart=always\n\
         RestartSec=5\n\
         Environment=LANG=C.UTF-8\n\
         Environment=LC_ALL=C.UTF-8\n\
         StandardOutput=journal\n\
         StandardError=journal\n\
         SyslogIdentifier={name}\n\
         \n\
         [Install]\n\
         WantedBy=multi-user.target\n",
        working_dir = unit.working_dir.display(),
        executable = unit.executable.display(),
        config = unit.config.display(),
    )
}

/// Validates a unit name.
///
/// # Errors
///
/// Returns [`SystemdError::InvalidName`] for empty names or characters
/// outside `[A-Za-z0-9_.@-]`.
pub fn validate_name(name: &str) -> Result<(), SystemdError> {
    let valid = !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '@' | '-'));
    if valid { Ok(()) } else { Err(SystemdError::InvalidName(name.to_string())) }
}

// ============================================================================
// SECTION: Service Manager
// ============================================================================

/// Lifecycle operations for one unit.
pub struct ServiceManager<R: CommandRunner> {
    /// Command runner.
    runner: R,
    /// Unit name without `.service`.
    name: String,
    /// Directory holding unit files.
    unit_dir: PathBuf,
}

impl<R: CommandRunner> ServiceManager<R> {
    /// Creates a manager for `name` under [`UNIT_DIR`].
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError::InvalidName`] for an invalid name.
    pub fn new(runner: R, name: &str) -> Result<Self, SystemdError> {
        Self::with_unit_dir(runner, name, Path::new(UNIT_DIR))
    }

    /// Creates a manager writing unit files to `unit_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError::InvalidName`] for an invalid name.
    pub fn with_unit_dir(runner: R, name: &str, unit_dir: &Path) -> Result<Self, SystemdError> {
        validate_name(name)?;
        Ok(Self {
            runner,
            name: name.to_string(),
            unit_dir: unit_dir.to_path_buf(),
        })
    }

    /// Returns the unit name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the unit file path.
    #[must_use]
    pub fn unit_path(&self) -> PathBuf {
        self.unit_dir.join(format!("{}.service", self.name))
    }

    /// Writes the unit file, reloads systemd, and enables and starts the unit.
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError`] when the file cannot be written or a
    /// `systemctl` call fails.
    pub fn install(&self, unit: &UnitSpec) -> Result<PathBuf, SystemdError> {
        let path = self.unit_path();
        fs::write(&path, unit_text(&self.name, unit)).map_err(|err| SystemdError::Io {
            path: path.display().to_string(),
            error: err.to_string(),
        })?;
        self.systemctl(&["daemon-reload"])?;
        self.systemctl(&["enable", "--now", &self.name])?;
        Ok(path)
    }

    /// Disables and stops the unit, removes its file, and reloads systemd.
    ///
    /// A unit that is already disabled or missing is not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError`] when the file cannot be removed or
    /// `daemon-reload` fails.
    pub fn uninstall(&self) -> Result<(), SystemdError> {
        let _ = self.runner.run("systemctl", &["disable", "--now", &self.name])?;
        let path = self.unit_path();
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(SystemdError::Io {
                    path: path.display().to_string(),
                    error: err.to_string(),
                });
            }
        }
        self.systemctl(&["daemon-reload"])?;
        Ok(())
    }

    /// Starts the unit.
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError::Command`] when `systemctl` fails.
    pub fn start(&self) -> Result<(), SystemdError> {
        self.systemctl(&["start", &self.name]).map(|_| ())
    }

    /// Stops the unit.
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError::Command`] when `systemctl` fails.
    pub fn stop(&self) -> Result<(), SystemdError> {
        self.systemctl(&["stop", &self.name]).map(|_| ())
    }

    /// Reloads the unit, restarting it when it cannot reload.
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError::Command`] when `systemctl` fails.
    pub fn reload(&self) -> Result<(), SystemdError> {
        self.systemctl(&["reload-or-restart", &self.name]).map(|_| ())
    }

    /// Returns `systemctl status` output followed by recent journal lines.
    ///
    /// Non-zero exits are expected for stopped units and are not errors;
    /// a missing `journalctl` is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SystemdError::Command`] when `systemctl` cannot be started.
    pub fn status(&self) -> Result<ServiceStatus, SystemdError> {
        let status =
            self.runner.run("systemctl", &["--no-pager", "--full", "status", &self.name])?;
        let journal = self
            .runner
            .run(
                "journalctl",
                &["-u", &self.name, "-n", JOURNAL_LINES, "--no-pager", "-o", "short-iso"],
            )
            .ok()
            .map(|output| output.stdout);
        Ok(ServiceStatus {
            active: status.success,
            status: status.stdout,
            journal,
        })
    }

    /// Runs `systemctl` and requires success.
    fn systemctl(&self, args: &[&str]) -> Result<CommandOutput, SystemdError> {
        let output = self.runner.run("systemctl", args)?;
        if output.success {
            Ok(output)
        } else {
            Err(SystemdError::Command {
                command: command_line("systemctl", args),
                error: output.stderr.trim().to_string(),
            })
        }
    }
}

/// Output of [`ServiceManager::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    /// True when `systemctl status` exited zero.
    pub active: bool,
    /// `systemctl status` output.
    pub status: String,
    /// Recent journal lines, when `journalctl` ran.
    pub journal: Option<String>,
}

// ============================================================================
// SECTION: Tests
// ============================================================================
