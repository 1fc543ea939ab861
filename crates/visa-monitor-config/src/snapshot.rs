// crates/visa-monitor-config/src/snapshot.rs
// ============================================================================
// Module: Visa Monitor Config Snapshot
// Description: Immutable, validated view of the full tracked set.
// Purpose: Give each cycle one consistent configuration to run against.
// Dependencies: crate::config, visa-monitor-core
// ============================================================================

//! ## Overview
//! A [`ConfigSnapshot`] merges operator-declared codes with verified
//! self-service registrations. It is built once per (re)load, shared as
//! `Arc<ConfigSnapshot>`, and replaced only between cycles.
//!
//! ## Invariants
//! - Codes are unique across both sources; duplicates reject the snapshot.
//! - Config-declared codes come first, in file order; user codes follow.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;

use visa_monitor_core::QueryCode;
use visa_monitor_core::TrackedCode;

use crate::config::ConfigError;
use crate::config::MonitorConfig;

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Validated configuration plus the merged tracked set.
#[derive(Debug, Clone)]
pub struct ConfigSnapshot {
    /// Parsed and validated configuration.
    pub config: MonitorConfig,
    /// Every tracked code, config entries first.
    pub tracked: Vec<TrackedCode>,
}

impl ConfigSnapshot {
    /// Loads the config file and merges `user_codes`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when loading, validation, or merging fails.
    pub fn load(path: Option<&Path>, user_codes: Vec<TrackedCode>) -> Result<Self, ConfigError> {
        let config = MonitorConfig::load(path)?;
        Self::from_config(config, user_codes)
    }

    /// Builds a snapshot from an already validated config.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] on malformed user codes or duplicate
    /// codes across sources.
    pub fn from_config(
        config: MonitorConfig,
        user_codes: Vec<TrackedCode>,
    ) -> Result<Self, ConfigError> {
        let mut tracked = config.tracked_codes()?;
        for code in &user_codes {
            code.query_type
                .validate_code(&code.code)
                .map_err(|err| ConfigError::Invalid(format!("user code: {err}")))?;
        }
        tracked.extend(user_codes);
        let duplicates = find_duplicates(&tracked);
        if !duplicates.is_empty() {
            let list: Vec<&str> = duplicates.iter().map(QueryCode::as_str).collect();
            return Err(ConfigError::Invalid(format!("duplicate query codes: {}", list.join(", "))));
        }
        Ok(Self {
            config,
            tracked,
        })
    }

    /// Returns the declared code entry for `code`.
    #[must_use]
    pub fn find(&self, code: &QueryCode) -> Option<&TrackedCode> {
        self.tracked.iter().find(|tracked| &tracked.code == code)
    }

    /// Returns the config file modification time seen at load.
    #[must_use]
    pub const fn source_modified_at(&self) -> Option<SystemTime> {
        self.config.source_modified_at
    }
}

/// Returns codes that appear more than once, sorted.
fn find_duplicates(tracked: &[TrackedCode]) -> BTreeSet<QueryCode> {
    let mut seen = BTreeSet::new();
    let mut duplicates = BTreeSet::new();
    for code in tracked {
        if !seen.insert(&code.code) {
            duplicates.insert(code.code.clone());
        }
    }
    duplicates
}
