// crates/visa-monitor-config/src/examples.rs
// ============================================================================
// Module: Config Examples
// Description: Canonical example configuration payload.
// Purpose: Deterministic starting point for operators and tests.
// Dependencies: std
// ============================================================================

//! ## Overview
//! Canonical example for `visa-monitor.toml`. The output is static and is
//! parsed and validated by the crate tests so it never drifts from the model.

/// Returns a canonical example `visa-monitor.toml` configuration.
#[must_use]
pub fn config_toml_example() -> String {
    String::from(
        r#"[scheduler]
default_freq_minutes = 60
workers = 2
poll_interval_secs = 300
unknown_policy = "suppress"
notify_first_not_found = false
jitter_min_ms = 10
jitter_max_ms = 60

[retry]
max_attempts = 3
base_delay_ms = 800
step_delay_ms = 200
jitter_ms = 50

[portal]
url = "https://ipc.gov.cz/en/status-of-your-application/"
connect_timeout_ms = 5000
request_timeout_ms = 15000

[storage]
site_dir = "site"
log_dir = "logs/monitor"

[notify]
email_max_per_minute = 10
email_first_check_delay_secs = 30
max_send_attempts = 3

[notify.smtp]
host = "smtp.example.com"
port = 465
user = "monitor@example.com"
pass = "change-me"
from = "monitor@example.com"

[server]
enabled = false
bind = "127.0.0.1:8000"
public_base_url = "https://visa.example.com"
rate_limit_per_minute = 100

[[codes]]
code = "PEKI202506020001"
channel = "email"
target = "applicant@example.com"
freq_minutes = 30
note = "family"

[[codes]]
code = "PEKI202506020002"
channel = ""
"#,
    )
}
