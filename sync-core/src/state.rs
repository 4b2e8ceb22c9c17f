//! Persistent per-file sync baselines.
//!
//! The store maps folder path -> (relative path -> [`FileRecord`]). Each
//! folder persists as one JSON file in the state directory, named by the
//! 32-bit FNV-1a hash of the absolute folder path rendered as eight
//! lowercase hex digits.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Last-known synced state of one file: the baseline for three-way change
/// detection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Path relative to the folder root, `/`-separated.
    pub rel_path: String,
    /// Lowercase SHA-256 hex of the content.
    pub hash: String,
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Permission bits.
    pub permission: u32,
    /// When the file was last synced.
    pub synced_at: DateTime<Utc>,
    /// Device name the content came from.
    pub synced_from: String,
}

/// Aggregate baseline state of one folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderState {
    /// Absolute folder path.
    pub path: PathBuf,
    /// Baselines keyed by relative path.
    pub files: HashMap<String, FileRecord>,
    /// Time of the last change to this folder's state.
    pub updated_at: DateTime<Utc>,
}

impl FolderState {
    fn empty(path: PathBuf) -> Self {
        Self {
            path,
            files: HashMap::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Thread-safe store of folder baselines with JSON persistence.
///
/// All accessors return clones; callers never alias the live table.
#[derive(Debug)]
pub struct StateStore {
    state_dir: PathBuf,
    folders: RwLock<HashMap<PathBuf, FolderState>>,
}

impl StateStore {
    /// Create a store persisting under the given state directory.
    ///
    /// Nothing is read from disk until [`StateStore::load`].
    pub fn new(state_dir: PathBuf) -> Self {
        Self {
            state_dir,
            folders: RwLock::new(HashMap::new()),
        }
    }

    /// Load all folder state files from the state directory.
    ///
    /// Unparseable files are skipped with a warning; in-memory state is
    /// replaced only by what loads cleanly.
    pub fn load(&self) -> Result<(), StateError> {
        crate::fsutil::ensure_dir(&self.state_dir).map_err(|source| StateError::CreateDir {
            path: self.state_dir.clone(),
            source,
        })?;

        let entries = std::fs::read_dir(&self.state_dir).map_err(|source| StateError::Read {
            path: self.state_dir.clone(),
            source,
        })?;

        // Read everything from disk first; the lock is taken only for the
        // map inserts.
        let mut loaded = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let contents = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(err) => {
                    tracing::warn!("Skipping unreadable state file {}: {}", path.display(), err);
                    continue;
                }
            };
            match serde_json::from_str::<FolderState>(&contents) {
                Ok(folder) => loaded.push(folder),
                Err(err) => {
                    tracing::warn!("Skipping corrupt state file {}: {}", path.display(), err);
                }
            }
        }

        let mut folders = self.folders.write();
        let count = loaded.len();
        for folder in loaded {
            folders.insert(folder.path.clone(), folder);
        }

        tracing::debug!("Loaded state for {} folder(s)", count);
        Ok(())
    }

    /// Persist every folder's state to disk.
    ///
    /// Writes go through a temporary file renamed into place. A folder that
    /// fails to write is logged and skipped; the rest still persist.
    pub fn save(&self) -> Result<(), StateError> {
        crate::fsutil::ensure_dir(&self.state_dir).map_err(|source| StateError::CreateDir {
            path: self.state_dir.clone(),
            source,
        })?;

        let folders = self.folders.read().clone();
        for folder in folders.values() {
            let path = self.state_file(&folder.path);
            if let Err(err) = write_state_file(&path, folder) {
                tracing::warn!("Failed to save state for {}: {}", folder.path.display(), err);
            }
        }
        Ok(())
    }

    /// Look up the baseline for one file.
    pub fn get(&self, folder: &Path, rel_path: &str) -> Option<FileRecord> {
        self.folders
            .read()
            .get(folder)
            .and_then(|f| f.files.get(rel_path))
            .cloned()
    }

    /// Insert or replace the baseline for one file.
    pub fn put(&self, folder: &Path, record: FileRecord) {
        let mut folders = self.folders.write();
        let state = folders
            .entry(folder.to_path_buf())
            .or_insert_with(|| FolderState::empty(folder.to_path_buf()));
        state.files.insert(record.rel_path.clone(), record);
        state.updated_at = Utc::now();
    }

    /// Remove the baseline for one file, if present.
    pub fn remove(&self, folder: &Path, rel_path: &str) {
        let mut folders = self.folders.write();
        if let Some(state) = folders.get_mut(folder) {
            state.files.remove(rel_path);
            state.updated_at = Utc::now();
        }
    }

    /// Start tracking a folder. Idempotent.
    pub fn init_folder(&self, folder: &Path) {
        let mut folders = self.folders.write();
        folders
            .entry(folder.to_path_buf())
            .or_insert_with(|| FolderState::empty(folder.to_path_buf()));
    }

    /// Drop all state for a folder, in memory and on disk.
    pub fn clear_folder(&self, folder: &Path) {
        self.folders.write().remove(folder);

        let path = self.state_file(folder);
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to remove state file {}: {}", path.display(), err);
            }
        }
    }

    /// All baselines of one folder, as a copy.
    pub fn folder_files(&self, folder: &Path) -> HashMap<String, FileRecord> {
        self.folders
            .read()
            .get(folder)
            .map(|f| f.files.clone())
            .unwrap_or_default()
    }

    /// The tracked folder paths.
    pub fn folders(&self) -> Vec<PathBuf> {
        self.folders.read().keys().cloned().collect()
    }

    fn state_file(&self, folder: &Path) -> PathBuf {
        let name = format!("{:08x}.json", fnv1a32(&folder.to_string_lossy()));
        self.state_dir.join(name)
    }
}

fn write_state_file(path: &Path, folder: &FolderState) -> Result<(), StateError> {
    let contents = serde_json::to_string_pretty(folder)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, contents).map_err(|source| StateError::Write {
        path: tmp.clone(),
        source,
    })?;
    std::fs::rename(&tmp, path).map_err(|source| StateError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// 32-bit FNV-1a over a string, used for stable state filenames.
fn fnv1a32(input: &str) -> u32 {
    let mut hash: u32 = 2_166_136_261;
    for byte in input.bytes() {
        hash ^= u32::from(byte);
        hash = hash.wrapping_mul(16_777_619);
    }
    hash
}
