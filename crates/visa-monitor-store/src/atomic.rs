// crates/visa-monitor-store/src/atomic.rs
// ============================================================================
// Module: Atomic File Writer
// Description: Temp-file + fsync + rename writes with a `.bak` mirror.
// Purpose: Guarantee readers see either the old or the new document, never a torn one.
// Dependencies: cap-std, cap-primitives, visa-monitor-core
// ============================================================================

//! ## Overview
//! Every write goes to a uniquely named sibling temp file opened with
//! `create_new` and no symlink following, is fsynced, and is renamed over the
//! target. The same bytes are then written to `<name>.bak` the same way.
//!
//! Loading reads the primary first and falls back to the backup when the
//! primary is missing or fails to parse.
//!
//! ## Invariants
//! - Temp files are never read; a crash between write and rename leaves the
//!   previous document in place.
//! - When neither file exists the load is a fresh start, not an error.
//! - When at least one exists and neither parses the load fails loudly.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::ffi::OsString;
use std::io::ErrorKind;
use std::io::Read;
use std::io::Write;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use cap_primitives::fs::FollowSymlinks;
use cap_std::ambient_authority;
use cap_std::fs::Dir;
use cap_std::fs::OpenOptions;
use visa_monitor_core::StoreError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum accepted state file size.
pub const MAX_STATE_FILE_BYTES: u64 = 64 * 1024 * 1024;
/// Temp-name attempts before giving up.
const MAX_TEMP_ATTEMPTS: u32 = 64;
/// Suffix appended to backup copies.
const BACKUP_SUFFIX: &str = ".bak";

// ============================================================================
// SECTION: Types
// ============================================================================

/// Where a loaded document came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    /// Primary file parsed.
    Primary,
    /// Primary was missing or unreadable; backup parsed.
    Backup,
    /// Neither file exists.
    Fresh,
}

/// Loaded document plus provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Loaded<T> {
    /// Parsed value; `None` on a fresh start.
    pub value: Option<T>,
    /// Which file produced the value.
    pub source: LoadSource,
    /// Why the primary was skipped, when the backup was used.
    pub primary_error: Option<String>,
}

/// A state file with atomic replace and backup semantics.
#[derive(Debug, Clone)]
pub struct AtomicFile {
    /// Directory holding the file.
    dir: PathBuf,
    /// File name within `dir`.
    name: OsString,
}

impl AtomicFile {
    /// Creates a handle for `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Invalid`] when `path` has no file name.
    pub fn new(path: &Path) -> Result<Self, StoreError> {
        let name = path
            .file_name()
            .ok_or_else(|| StoreError::Invalid(format!("missing file name: {}", path.display())))?
            .to_os_string();
        let dir = path.parent().map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let dir = if dir.as_os_str().is_empty() { PathBuf::from(".") } else { dir };
        Ok(Self {
            dir,
            name,
        })
    }

    /// Returns the primary file path.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.name)
    }

    /// Returns the backup file path.
    #[must_use]
    pub fn backup_path(&self) -> PathBuf {
        self.dir.join(self.backup_name())
    }

    /// Writes `bytes` to the primary and then to the backup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when either write fails.
    pub fn write(&self, bytes: &[u8]) -> Result<(), StoreError> {
        self.replace(bytes)?;
        let dir = open_dir(&self.dir, true)?;
        write_file_atomic(&dir, Path::new(&self.backup_name()), bytes)
    }

    /// Atomically replaces the primary only, leaving no backup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the write fails.
    pub fn replace(&self, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = open_dir(&self.dir, true)?;
        write_file_atomic(&dir, Path::new(&self.name), bytes)
    }

    /// Loads the document, falling back to the backup.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Corrupt`] when files exist but none parses, or
    /// [`StoreError::Io`] when the directory cannot be opened.
    pub fn load<T, F>(&self, parse: F) -> Result<Loaded<T>, StoreError>
    where
        F: Fn(&[u8]) -> Result<T, String>,
    {
        let dir = match open_dir(&self.dir, false) {
            Ok(dir) => dir,
            Err(StoreError::Invalid(_)) => {
                return Ok(Loaded {
                    value: None,
                    source: LoadSource::Fresh,
                    primary_error: None,
                });
            }
            Err(err) => return Err(err),
        };
        let primary = read_optional(&dir, Path::new(&self.name));
        let primary_error = match primary {
            Ok(Some(bytes)) => match parse(&bytes) {
                Ok(value) => {
                    return Ok(Loaded {
                        value: Some(value),
                        source: LoadSource::Primary,
                        primary_error: None,
                    });
                }
                Err(err) => Some(err),
            },
            Ok(None) => None,
            Err(err) => Some(err.to_string()),
        };
        let backup = read_optional(&dir, Path::new(&self.backup_name()));
        let backup_error = match backup {
            Ok(Some(bytes)) => match parse(&bytes) {
                Ok(value) => {
                    return Ok(Loaded {
                        value: Some(value),
                        source: LoadSource::Backup,
                        primary_error: Some(
                            primary_error.unwrap_or_else(|| "primary missing".to_string()),
                        ),
                    });
                }
                Err(err) => Some(err),
            },
            Ok(None) => None,
            Err(err) => Some(err.to_string()),
        };
        match (primary_error, backup_error) {
            (None, None) => Ok(Loaded {
                value: None,
                source: LoadSource::Fresh,
                primary_error: None,
            }),
            (primary, backup) => Err(StoreError::Corrupt(format!(
                "{}: primary: {}; backup: {}",
                self.path().display(),
                primary.unwrap_or_else(|| "missing".to_string()),
                backup.unwrap_or_else(|| "missing".to_string()),
            ))),
        }
    }

    /// Returns the backup file name.
    fn backup_name(&self) -> OsString {
        let mut name = self.name.clone();
        name.push(BACKUP_SUFFIX);
        name
    }
}

// ============================================================================
// SECTION: Helpers
// ============================================================================

/// Opens `path` as a capability handle, optionally creating missing levels.
///
/// A missing directory without `create_missing` maps to
/// [`StoreError::Invalid`] so callers can treat it as a fresh start.
fn open_dir(path: &Path, create_missing: bool) -> Result<Dir, StoreError> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .map_err(|err| StoreError::Io(err.to_string()))?
    };
    let mut anchor = PathBuf::new();
    let mut components = Vec::new();
    for component in absolute.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => anchor.push(component.as_os_str()),
            Component::CurDir => {}
            Component::Normal(value) => components.push(value.to_os_string()),
            Component::ParentDir => {
                return Err(StoreError::Io(format!(
                    "state path must not contain '..': {}",
                    path.display()
                )));
            }
        }
    }
    let mut current =
        Dir::open_ambient_dir(&anchor, ambient_authority()).map_err(|err| StoreError::Io(err.to_string()))?;
    for component in components {
        current = match open_or_create_child_dir(&current, Path::new(&component), create_missing) {
            Ok(dir) => dir,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(StoreError::Invalid(format!("missing directory: {}", path.display())));
            }
            Err(err) => return Err(StoreError::Io(err.to_string())),
        };
    }
    Ok(current)
}

/// Opens a child directory without following symlinks.
fn open_child_dir_nofollow(parent: &Dir, child: &Path) -> std::io::Result<Dir> {
    let mut options = OpenOptions::new();
    options.read(true);
    options._cap_fs_ext_follow(FollowSymlinks::No);
    let file = parent.open_with(child, &options)?;
    let metadata = file.metadata()?;
    if !metadata.is_dir() {
        return Err(std::io::Error::new(ErrorKind::InvalidInput, "path component is not a directory"));
    }
    Ok(Dir::from_std_file(file.into_std()))
}

/// Opens or creates a child directory without following symlinks.
fn open_or_create_child_dir(
    parent: &Dir,
    child: &Path,
    create_missing: bool,
) -> std::io::Result<Dir> {
    match open_child_dir_nofollow(parent, child) {
        Ok(dir) => Ok(dir),
        Err(err) if err.kind() == ErrorKind::NotFound && create_missing => {
            parent.create_dir(child)?;
            open_child_dir_nofollow(parent, child)
        }
        Err(err) => Err(err),
    }
}

/// Reads a file if present, refusing symlinks and oversized files.
fn read_optional(dir: &Dir, name: &Path) -> std::io::Result<Option<Vec<u8>>> {
    let mut options = OpenOptions::new();
    options.read(true);
    options._cap_fs_ext_follow(FollowSymlinks::No);
    let mut file = match dir.open_with(name, &options) {
        Ok(file) => file,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err),
    };
    let metadata = file.metadata()?;
    if !metadata.is_file() {
        return Err(std::io::Error::new(ErrorKind::InvalidInput, "state path is not a file"));
    }
    if metadata.len() > MAX_STATE_FILE_BYTES {
        return Err(std::io::Error::new(ErrorKind::InvalidData, "state file exceeds size limit"));
    }
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    Ok(Some(bytes))
}

/// Writes file bytes using a temporary sibling and atomic rename.
fn write_file_atomic(parent: &Dir, file_name: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    for attempt in 0 .. MAX_TEMP_ATTEMPTS {
        let temp_name = temp_file_name(file_name, attempt)?;
        let mut options = OpenOptions::new();
        options.write(true).create_new(true);
        options._cap_fs_ext_follow(FollowSymlinks::No);
        match parent.open_with(&temp_name, &options) {
            Ok(mut temp_file) => {
                if let Err(err) = temp_file.write_all(bytes) {
                    let _ = parent.remove_file(&temp_name);
                    return Err(StoreError::Io(err.to_string()));
                }
                if let Err(err) = temp_file.sync_all() {
                    let _ = parent.remove_file(&temp_name);
                    return Err(StoreError::Io(err.to_string()));
                }
                if let Err(err) = parent.rename(&temp_name, parent, file_name) {
                    let _ = parent.remove_file(&temp_name);
                    return Err(StoreError::Io(err.to_string()));
                }
                return Ok(());
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {}
            Err(err) => return Err(StoreError::Io(err.to_string())),
        }
    }
    Err(StoreError::Io("unable to allocate temporary state file".to_string()))
}

/// Builds a temporary file name for atomic writes.
fn temp_file_name(file_name: &Path, attempt: u32) -> Result<PathBuf, StoreError> {
    let Some(base_name) = file_name.file_name() else {
        return Err(StoreError::Invalid(format!("missing file name: {}", file_name.display())));
    };
    let mut temp = OsString::from(".tmp-");
    temp.push(base_name);
    temp.push(format!(".{}.{}", std::process::id(), attempt));
    Ok(PathBuf::from(temp))
}

// ============================================================================
// SECTION: Tests
// ============================================================================
