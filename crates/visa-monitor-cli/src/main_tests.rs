// crates/visa-monitor-cli/src/main_tests.rs
// ============================================================================
// Module: CLI Main Helpers Tests
// Description: Unit tests for argument parsing and error mapping.
// Purpose: Keep flags, defaults, and exit codes stable for operators.
// Dependencies: visa-monitor-cli main helpers
// ============================================================================

//! ## Overview
//! Parses representative command lines and checks locale resolution and the
//! exit-code taxonomy.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

// ============================================================================
// SECTION: Imports
// ============================================================================

use clap::CommandFactory;
use clap::Parser;
use time::macros::date;
use visa_monitor_cli::i18n::Locale;
use visa_monitor_runtime::RuntimeError;

use super::Cli;
use super::Commands;
use super::ConfigCommand;
use super::ErrorKind;
use super::LangArg;
use super::MonitorCommand;
use super::codegen_options;
use super::resolve_locale;
use super::runtime_error;

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Parses a command line, panicking on clap errors.
fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(std::iter::once("visa-monitor").chain(args.iter().copied())).unwrap()
}

// ============================================================================
// SECTION: Tests
// ============================================================================

/// Verifies the clap definition is internally consistent.
#[test]
fn command_definition_is_valid() {
    Cli::command().debug_assert();
}

/// Verifies generate-codes defaults and short flags.
#[test]
fn generate_codes_flags_and_aliases() {
    let cli = parse(&["gc", "-s", "2025-06-02", "-n", "3", "-w", "-x", "35", "-p", "brno"]);
    let Some(Commands::GenerateCodes(command)) = cli.command else {
        panic!("expected generate-codes");
    };
    assert_eq!(command.output.to_str(), Some("query_codes.csv"));
    let options = codegen_options(&command, date!(2025 - 06 - 30)).unwrap();
    assert_eq!(options.start, date!(2025 - 06 - 02));
    assert_eq!(options.end, date!(2025 - 06 - 30));
    assert_eq!(options.per_day, 3);
    assert!(options.include_weekends);
    assert_eq!(options.excluded_weekdays.into_iter().collect::<Vec<_>>(), vec![3, 5]);
    assert_eq!(options.prefix, "brno");
}

/// Verifies a malformed date is a usage error.
#[test]
fn generate_codes_rejects_bad_dates() {
    let cli = parse(&["generate-codes", "-e", "2025/06/30"]);
    let Some(Commands::GenerateCodes(command)) = cli.command else {
        panic!("expected generate-codes");
    };
    let err = codegen_options(&command, date!(2025 - 06 - 30)).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Usage);
    assert!(err.message.contains("2025/06/30"));
}

/// Verifies monitor and config subcommands parse with their defaults.
#[test]
fn monitor_and_config_subcommands_parse() {
    let cli = parse(&["monitor", "run", "--config", "site.toml", "--once"]);
    let Some(Commands::Monitor {
        command: MonitorCommand::Run(run),
    }) = cli.command
    else {
        panic!("expected monitor run");
    };
    assert!(run.once);
    assert_eq!(run.config.unwrap().to_str(), Some("site.toml"));

    let cli = parse(&["monitor", "status"]);
    let Some(Commands::Monitor {
        command: MonitorCommand::Status(args),
    }) = cli.command
    else {
        panic!("expected monitor status");
    };
    assert_eq!(args.name, "cz-visa-monitor");

    let cli = parse(&["--lang", "zh", "config", "example"]);
    assert_eq!(cli.lang, Some(LangArg::Zh));
    assert!(matches!(
        cli.command,
        Some(Commands::Config {
            command: ConfigCommand::Example
        })
    ));
}

/// Verifies clean accepts the short keep flag and the `--fm` alias.
#[test]
fn clean_flags_and_aliases() {
    let cli = parse(&["cl", "-i", "checked.csv", "-k", "g,p", "--fm", "t:you@example.com,f:60"]);
    let Some(Commands::Clean(command)) = cli.command else {
        panic!("expected clean");
    };
    assert_eq!(command.input.to_str(), Some("checked.csv"));
    assert_eq!(command.keep.as_deref(), Some("g,p"));
    assert_eq!(command.for_monitor.as_deref(), Some("t:you@example.com,f:60"));
    assert!(command.output.is_none());
}

/// Verifies unknown flags are rejected by clap.
#[test]
fn unknown_flags_fail_to_parse() {
    let result = Cli::try_parse_from(["visa-monitor", "check", "--bogus"]);
    assert!(result.is_err());
}

/// Verifies locale precedence: flag, then environment, then English.
#[test]
fn locale_resolution_prefers_flag() {
    assert_eq!(resolve_locale(Some(LangArg::Zh), Some("en")).unwrap(), Locale::Zh);
    assert_eq!(resolve_locale(None, Some("zh_CN.UTF-8")).unwrap(), Locale::Zh);
    assert_eq!(resolve_locale(None, None).unwrap(), Locale::En);
    let err = resolve_locale(None, Some("fr")).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Usage);
}

/// Verifies runtime failures map onto the exit-code taxonomy.
#[test]
fn runtime_errors_map_to_exit_codes() {
    let cases = [
        (RuntimeError::Config("bad".to_string()), 2),
        (RuntimeError::Store("disk".to_string()), 3),
        (RuntimeError::Server("bind".to_string()), 4),
        (RuntimeError::Execution("tls".to_string()), 4),
    ];
    for (err, code) in cases {
        assert_eq!(runtime_error(&err).kind.code(), code);
    }
    assert_eq!(ErrorKind::Usage.code(), 1);
}
