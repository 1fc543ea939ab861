//! Config snapshot merge tests for visa-monitor-config.
// crates/visa-monitor-config/tests/snapshot.rs
// =============================================================================
// Module: Config Snapshot Tests
// Description: Validate merging of config and user codes.
// Purpose: Ensure duplicate codes fail closed rather than merging.
// =============================================================================

#![allow(clippy::use_debug, reason = "Test-only diagnostics.")]

use visa_monitor_config::ConfigSnapshot;
use visa_monitor_config::MonitorConfig;
use visa_monitor_core::CodeOrigin;
use visa_monitor_core::QueryCode;
use visa_monitor_core::TrackedCode;

type TestResult = Result<(), String>;

fn config_with_code(code: &str) -> Result<MonitorConfig, String> {
    let text = format!("[[codes]]\ncode = \"{code}\"\ntarget = \"a@example.com\"\n");
    let mut config = MonitorConfig::parse_str(&text).map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    Ok(config)
}

fn user_code(code: &str) -> TrackedCode {
    let mut tracked = TrackedCode::email(QueryCode::new(code), "u@example.com");
    tracked.origin = CodeOrigin::User;
    tracked
}

#[test]
fn snapshot_orders_config_codes_first() -> TestResult {
    let config = config_with_code("PEKI202506020002")?;
    let snapshot = ConfigSnapshot::from_config(config, vec![user_code("PEKI202506020001")])
        .map_err(|err| err.to_string())?;
    let order: Vec<(&str, CodeOrigin)> =
        snapshot.tracked.iter().map(|code| (code.code.as_str(), code.origin)).collect();
    if order
        != vec![("PEKI202506020002", CodeOrigin::Config), ("PEKI202506020001", CodeOrigin::User)]
    {
        return Err(format!("unexpected order {order:?}"));
    }
    if snapshot.find(&QueryCode::new("PEKI202506020001")).is_none() {
        return Err("user code not found".to_string());
    }
    Ok(())
}

#[test]
fn snapshot_rejects_duplicates_across_sources() -> TestResult {
    let config = config_with_code("PEKI202506020001")?;
    match ConfigSnapshot::from_config(config, vec![user_code("peki202506020001")]) {
        Err(err) if err.to_string().contains("duplicate query codes: PEKI202506020001") => Ok(()),
        Err(err) => Err(format!("unexpected error {err}")),
        Ok(_) => Err("expected duplicate rejection".to_string()),
    }
}

#[test]
fn snapshot_rejects_duplicates_within_config() -> TestResult {
    let text = "[[codes]]\ncode = \"PEKI202506020001\"\nchannel = \"\"\n\n[[codes]]\ncode = \"PEKI202506020001\"\nchannel = \"\"\n";
    let mut config = MonitorConfig::parse_str(text).map_err(|err| err.to_string())?;
    config.validate().map_err(|err| err.to_string())?;
    if ConfigSnapshot::from_config(config, Vec::new()).is_ok() {
        return Err("expected duplicate rejection".to_string());
    }
    Ok(())
}
