// crates/visa-monitor-core/src/runtime/store.rs
// ============================================================================
// Module: Visa Monitor In-Memory Store
// Description: Simple in-memory snapshot store for tests and dry runs.
// Purpose: Provide a deterministic store implementation without file I/O.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of [`SnapshotStore`] for
//! tests and `--once` dry runs. It is not intended for production use.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::core::QueryCode;
use crate::core::StatusSnapshot;
use crate::core::Timestamp;
use crate::interfaces::SnapshotStore;
use crate::interfaces::StoreError;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// In-memory snapshot store.
#[derive(Debug, Default, Clone)]
pub struct InMemorySnapshotStore {
    /// Snapshot map protected by a mutex.
    items: Arc<Mutex<BTreeMap<QueryCode, StatusSnapshot>>>,
    /// Number of completed writes.
    writes: Arc<Mutex<u64>>,
}

impl InMemorySnapshotStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store seeded with `items`.
    #[must_use]
    pub fn with_items(items: BTreeMap<QueryCode, StatusSnapshot>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
            writes: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the number of writes performed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the mutex is poisoned.
    pub fn write_count(&self) -> Result<u64, StoreError> {
        self.writes
            .lock()
            .map(|guard| *guard)
            .map_err(|_| StoreError::Io("snapshot store mutex poisoned".to_string()))
    }
}

impl SnapshotStore for InMemorySnapshotStore {
    fn load_all(&self) -> Result<BTreeMap<QueryCode, StatusSnapshot>, StoreError> {
        let guard = self
            .items
            .lock()
            .map_err(|_| StoreError::Io("snapshot store mutex poisoned".to_string()))?;
        Ok(guard.clone())
    }

    fn save_all(
        &self,
        items: &BTreeMap<QueryCode, StatusSnapshot>,
        _generated_at: Timestamp,
    ) -> Result<(), StoreError> {
        {
            let mut guard = self
                .items
                .lock()
                .map_err(|_| StoreError::Io("snapshot store mutex poisoned".to_string()))?;
            guard.clone_from(items);
        }
        let mut writes = self
            .writes
            .lock()
            .map_err(|_| StoreError::Io("snapshot store mutex poisoned".to_string()))?;
        *writes = writes.saturating_add(1);
        Ok(())
    }
}
