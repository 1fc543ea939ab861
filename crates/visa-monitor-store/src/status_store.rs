// crates/visa-monitor-store/src/status_store.rs
// ============================================================================
// Module: Status Store
// Description: File-backed snapshot store over the atomic writer.
// Purpose: Persist per-code status so restarts resume without re-notifying.
// Dependencies: crate::atomic, visa-monitor-core, serde_json
// ============================================================================

//! ## Overview
//! [`FileStatusStore`] keeps `status.json` as a whole document
//! (`{generated_at, items}`) and rewrites it through [`AtomicFile`] after
//! every per-code update. The HTTP status surface reads through the same
//! load path, so it only ever observes complete documents.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use visa_monitor_core::QueryCode;
use visa_monitor_core::SnapshotStore;
use visa_monitor_core::StatusDocument;
use visa_monitor_core::StatusSnapshot;
use visa_monitor_core::StoreError;
use visa_monitor_core::Timestamp;

use crate::atomic::AtomicFile;
use crate::atomic::Loaded;

// ============================================================================
// SECTION: Store
// ============================================================================

/// File-backed status store.
#[derive(Debug, Clone)]
pub struct FileStatusStore {
    /// Atomic file handle for `status.json`.
    file: AtomicFile,
}

impl FileStatusStore {
    /// Creates a store writing to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `path` has no file name.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        Ok(Self {
            file: AtomicFile::new(path)?,
        })
    }

    /// Returns the primary file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.file.path()
    }

    /// Loads the document with provenance.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when neither the file nor its backup
    /// parses.
    pub fn load_document(&self) -> Result<Loaded<StatusDocument>, StoreError> {
        self.file.load(|bytes| {
            serde_json::from_slice::<StatusDocument>(bytes).map_err(|err| err.to_string())
        })
    }
}

impl SnapshotStore for FileStatusStore {
    fn load_all(&self) -> Result<BTreeMap<QueryCode, StatusSnapshot>, StoreError> {
        Ok(self.load_document()?.value.map(|document| document.items).unwrap_or_default())
    }

    fn save_all(
        &self,
        items: &BTreeMap<QueryCode, StatusSnapshot>,
        generated_at: Timestamp,
    ) -> Result<(), StoreError> {
        let document = StatusDocument::new(generated_at, items.clone());
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|err| StoreError::Serialization(err.to_string()))?;
        self.file.write(&bytes)
    }
}
