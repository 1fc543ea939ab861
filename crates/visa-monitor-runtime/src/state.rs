// crates/visa-monitor-runtime/src/state.rs
// ============================================================================
// Module: State Loading
// Description: Startup load of configuration, user codes, and status state.
// Purpose: Compose the config snapshot with both persisted documents.
// Dependencies: visa-monitor-config, visa-monitor-core, visa-monitor-store
// ============================================================================

//! ## Overview
//! The tracked set is the configured codes plus verified user codes from
//! `users.json`. Both state files load through the atomic store; a backup
//! fallback is reported as an event rather than silently accepted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use visa_monitor_config::ConfigSnapshot;
use visa_monitor_config::MonitorConfig;
use visa_monitor_config::StorageConfig;
use visa_monitor_core::MonitorEvent;
use visa_monitor_core::MonitorEventSink;
use visa_monitor_core::QueryCode;
use visa_monitor_core::StatusSnapshot;
use visa_monitor_core::events;
use visa_monitor_store::FileStatusStore;
use visa_monitor_store::LoadSource;
use visa_monitor_store::Loaded;
use visa_monitor_store::UsersDocument;
use visa_monitor_store::UsersStore;

use crate::error::RuntimeError;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Handles for both state files.
#[derive(Debug, Clone)]
pub struct StateStores {
    /// `status.json` store.
    pub status: Arc<FileStatusStore>,
    /// `users.json` store.
    pub users: UsersStore,
}

impl StateStores {
    /// Opens the stores under the configured site directory.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Store`] when a path is unusable.
    pub fn for_config(storage: &StorageConfig) -> Result<Self, RuntimeError> {
        Ok(Self {
            status: Arc::new(FileStatusStore::new(&storage.status_path())?),
            users: UsersStore::new(&storage.users_path())?,
        })
    }
}

/// Everything needed to start scheduling.
#[derive(Debug, Clone)]
pub struct LoadedState {
    /// Validated config and merged tracked set.
    pub snapshot: ConfigSnapshot,
    /// Stored snapshots.
    pub items: BTreeMap<QueryCode, StatusSnapshot>,
    /// Store handles.
    pub stores: StateStores,
}

// ============================================================================
// SECTION: Loading
// ============================================================================

/// Loads config, user codes, and status state.
///
/// # Errors
///
/// Returns [`RuntimeError::Config`] on invalid configuration and
/// [`RuntimeError::Store`] when state is unreadable.
pub fn load_state(
    config_path: Option<&Path>,
    sink: &dyn MonitorEventSink,
) -> Result<LoadedState, RuntimeError> {
    let config = MonitorConfig::load(config_path)?;
    let stores = StateStores::for_config(&config.storage)?;
    let snapshot = build_snapshot(config, &stores.users, sink)?;
    let loaded = stores.status.load_document()?;
    report_backup(sink, "status", &stores.status.path().display().to_string(), &loaded);
    let items = loaded.value.map(|document| document.items).unwrap_or_default();
    Ok(LoadedState {
        snapshot,
        items,
        stores,
    })
}

/// Merges `config` with the verified user codes.
///
/// # Errors
///
/// Returns [`RuntimeError`] when users cannot be read or the merged set is
/// invalid.
pub fn build_snapshot(
    config: MonitorConfig,
    users: &UsersStore,
    sink: &dyn MonitorEventSink,
) -> Result<ConfigSnapshot, RuntimeError> {
    let document = load_users(users, sink)?;
    Ok(ConfigSnapshot::from_config(config, document.tracked_codes())?)
}

/// Loads the users document, reporting a backup fallback.
///
/// # Errors
///
/// Returns [`RuntimeError::Store`] when neither copy parses.
pub fn load_users(
    users: &UsersStore,
    sink: &dyn MonitorEventSink,
) -> Result<UsersDocument, RuntimeError> {
    let loaded = users.load_document()?;
    report_backup(sink, "users", "users.json", &loaded);
    Ok(loaded.value.unwrap_or_default())
}

/// Emits an event when a document came from its backup.
fn report_backup<T>(sink: &dyn MonitorEventSink, store: &str, path: &str, loaded: &Loaded<T>) {
    if loaded.source == LoadSource::Backup {
        sink.record(
            &MonitorEvent::new(events::STORE_RECOVERED_FROM_BACKUP)
                .with("store", store)
                .with("path", path)
                .with("primary_error", loaded.primary_error.clone().unwrap_or_default()),
        );
    }
}
