//! Baseline-driven conflict detection and policy-driven resolution.
//!
//! Detection is three-way: the local hash and the remote hash are each
//! compared against the stored baseline. Only "both sides changed" (or
//! "files differ with no shared history") is a conflict; a one-sided
//! change just means that side is newer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::ConflictError;
use crate::fsutil;
use crate::state::StateStore;

/// Configured policy for automatic conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The side with the later modification time wins; ties go to local.
    NewestWins,
    /// Rename the local file aside, then accept the remote content.
    KeepBoth,
    /// Leave the file untouched and surface the conflict for a decision.
    Prompt,
}

impl Default for Strategy {
    fn default() -> Self {
        Self::NewestWins
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::NewestWins => "newest_wins",
            Self::KeepBoth => "keep_both",
            Self::Prompt => "prompt",
        })
    }
}

/// Outcome of resolving one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// The local content stays; the remote version is not fetched.
    KeepLocal,
    /// The remote content will be fetched and applied.
    KeepRemote,
    /// The local file was renamed aside; the remote content will be
    /// fetched under the original name.
    KeepBoth,
    /// No action; the conflict stays open.
    Skip,
}

/// One side's view of a conflicting file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictFile {
    /// Size in bytes.
    pub size: u64,
    /// Last modification time.
    pub mod_time: DateTime<Utc>,
    /// Lowercase SHA-256 hex of the content.
    pub hash: String,
    /// Device the version lives on; empty for the local side.
    pub device_name: String,
}

/// A detected divergence awaiting resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// Stable id: `<folder>:<rel_path>`.
    pub id: String,
    /// Absolute folder path.
    pub folder_path: PathBuf,
    /// Path relative to the folder root.
    pub rel_path: String,
    /// The local version.
    pub local: ConflictFile,
    /// The remote version.
    pub remote: ConflictFile,
    /// When the divergence was detected.
    pub detected_at: DateTime<Utc>,
    /// How the conflict was resolved, once it has been.
    pub resolution: Option<Resolution>,
}

/// Detects conflicts against stored baselines and applies the configured
/// resolution strategy.
pub struct ConflictDetector {
    device_name: String,
    strategy: Strategy,
    store: Arc<StateStore>,
    open: Mutex<HashMap<String, Conflict>>,
}

impl ConflictDetector {
    /// Create a detector for this device with the given strategy.
    pub fn new(device_name: String, strategy: Strategy, store: Arc<StateStore>) -> Self {
        Self {
            device_name,
            strategy,
            store,
            open: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether a remote version of a file conflicts with the local
    /// one.
    ///
    /// Returns `None` when the local file is absent, when the hashes
    /// already match, or when only one side changed relative to the
    /// baseline. A detected conflict is recorded in the open set.
    pub fn detect(
        &self,
        folder_path: &Path,
        rel_path: &str,
        remote: &ConflictFile,
    ) -> Option<Conflict> {
        let full_path = folder_path.join(rel_path);

        let metadata = std::fs::metadata(&full_path).ok()?;
        let local_hash = fsutil::hash_file(&full_path).ok()?;

        if local_hash == remote.hash {
            return None;
        }

        let local = ConflictFile {
            size: metadata.len(),
            mod_time: metadata
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now()),
            hash: local_hash.clone(),
            device_name: String::new(),
        };

        let conflicting = match self.store.get(folder_path, rel_path) {
            // Files differ with no shared history.
            None => true,
            Some(baseline) => {
                let local_changed = local_hash != baseline.hash;
                let remote_changed = remote.hash != baseline.hash;
                local_changed && remote_changed
            }
        };

        if !conflicting {
            return None;
        }

        let conflict = Conflict {
            id: format!("{}:{}", folder_path.display(), rel_path),
            folder_path: folder_path.to_path_buf(),
            rel_path: rel_path.to_string(),
            local,
            remote: remote.clone(),
            detected_at: Utc::now(),
            resolution: None,
        };

        self.open
            .lock()
            .insert(conflict.id.clone(), conflict.clone());
        Some(conflict)
    }

    /// Resolve a conflict according to the configured strategy.
    ///
    /// `Prompt` does not resolve: the conflict stays open and `Skip` is
    /// returned so the caller leaves the file untouched.
    pub fn auto_resolve(&self, conflict: &Conflict) -> Result<Resolution, ConflictError> {
        match self.strategy {
            Strategy::NewestWins => {
                // Ties break toward local.
                let resolution = if conflict.local.mod_time >= conflict.remote.mod_time {
                    Resolution::KeepLocal
                } else {
                    Resolution::KeepRemote
                };
                self.resolve(conflict, resolution)?;
                Ok(resolution)
            }
            Strategy::KeepBoth => {
                self.resolve(conflict, Resolution::KeepBoth)?;
                Ok(Resolution::KeepBoth)
            }
            Strategy::Prompt => Ok(Resolution::Skip),
        }
    }

    /// Apply a resolution to a conflict and close it.
    ///
    /// `KeepBoth` renames the local file to its conflict name; the caller
    /// is expected to fetch the remote content afterwards. `Skip` closes
    /// the conflict without touching the filesystem. Returns the closed
    /// conflict with its verdict recorded.
    pub fn resolve(
        &self,
        conflict: &Conflict,
        resolution: Resolution,
    ) -> Result<Conflict, ConflictError> {
        if resolution == Resolution::KeepBoth {
            let full_path = conflict.folder_path.join(&conflict.rel_path);
            let renamed = fsutil::conflict_file_name(&full_path, &self.device_name, Local::now());
            std::fs::rename(&full_path, &renamed).map_err(|source| ConflictError::Rename {
                path: full_path,
                source,
            })?;
            tracing::info!(
                "Kept both versions of {}: local renamed to {}",
                conflict.rel_path,
                renamed.display()
            );
        }

        let mut closed = self
            .open
            .lock()
            .remove(&conflict.id)
            .unwrap_or_else(|| conflict.clone());
        closed.resolution = Some(resolution);
        Ok(closed)
    }

    /// Resolve an open conflict by id.
    pub fn resolve_by_id(
        &self,
        id: &str,
        resolution: Resolution,
    ) -> Result<Conflict, ConflictError> {
        let conflict = self
            .open
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ConflictError::NotFound { id: id.to_string() })?;
        self.resolve(&conflict, resolution)
    }

    /// All currently open conflicts.
    pub fn open_conflicts(&self) -> Vec<Conflict> {
        self.open.lock().values().cloned().collect()
    }

    /// Whether any conflict is open.
    pub fn has_open(&self) -> bool {
        !self.open.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsutil::hash_bytes;
    use crate::state::FileRecord;
    use tempfile::{tempdir, TempDir};

    fn setup(strategy: Strategy) -> (TempDir, TempDir, ConflictDetector, Arc<StateStore>) {
        let folder = tempdir().unwrap();
        let state_dir = tempdir().unwrap();
        let store = Arc::new(StateStore::new(state_dir.path().to_path_buf()));
        let detector = ConflictDetector::new("Alpha".into(), strategy, store.clone());
        (folder, state_dir, detector, store)
    }

    fn remote(hash: &str) -> ConflictFile {
        ConflictFile {
            size: 2,
            mod_time: Utc::now(),
            hash: hash.into(),
            device_name: "Beta".into(),
        }
    }

    fn baseline(rel_path: &str, hash: &str) -> FileRecord {
        FileRecord {
            rel_path: rel_path.into(),
            hash: hash.into(),
            size: 2,
            mod_time: Utc::now(),
            permission: 0o644,
            synced_at: Utc::now(),
            synced_from: "Beta".into(),
        }
    }

    #[test]
    fn absent_local_file_is_not_a_conflict() {
        let (folder, _s, detector, _store) = setup(Strategy::NewestWins);
        assert!(detector
            .detect(folder.path(), "missing.txt", &remote("h"))
            .is_none());
    }

    #[test]
    fn equal_hashes_are_not_a_conflict() {
        let (folder, _s, detector, _store) = setup(Strategy::NewestWins);
        std::fs::write(folder.path().join("a.txt"), b"same").unwrap();

        let verdict = detector.detect(folder.path(), "a.txt", &remote(&hash_bytes(b"same")));
        assert!(verdict.is_none());
        assert!(!detector.has_open());
    }

    #[test]
    fn differing_files_without_baseline_conflict() {
        let (folder, _s, detector, _store) = setup(Strategy::Prompt);
        std::fs::write(folder.path().join("a.txt"), b"local").unwrap();

        let verdict = detector.detect(folder.path(), "a.txt", &remote(&hash_bytes(b"remote")));
        assert!(verdict.is_some());
        assert_eq!(detector.open_conflicts().len(), 1);
    }

    #[test]
    fn one_sided_remote_change_is_not_a_conflict() {
        let (folder, _s, detector, store) = setup(Strategy::NewestWins);
        std::fs::write(folder.path().join("a.txt"), b"old").unwrap();
        store.put(
            folder.path(),
            baseline("a.txt", &hash_bytes(b"old")),
        );

        // Local still matches the baseline, only remote moved on.
        let verdict = detector.detect(folder.path(), "a.txt", &remote(&hash_bytes(b"new")));
        assert!(verdict.is_none());
    }

    #[test]
    fn one_sided_local_change_is_not_a_conflict() {
        let (folder, _s, detector, store) = setup(Strategy::NewestWins);
        std::fs::write(folder.path().join("a.txt"), b"edited").unwrap();
        store.put(
            folder.path(),
            baseline("a.txt", &hash_bytes(b"old")),
        );

        // Remote still matches the baseline, only we moved on.
        let verdict = detector.detect(folder.path(), "a.txt", &remote(&hash_bytes(b"old")));
        assert!(verdict.is_none());
    }

    #[test]
    fn both_sides_changed_is_a_conflict() {
        let (folder, _s, detector, store) = setup(Strategy::Prompt);
        std::fs::write(folder.path().join("a.txt"), b"local edit").unwrap();
        store.put(
            folder.path(),
            baseline("a.txt", &hash_bytes(b"old")),
        );

        let verdict = detector.detect(folder.path(), "a.txt", &remote(&hash_bytes(b"remote edit")));
        assert!(verdict.is_some());
    }

    #[test]
    fn detection_is_deterministic() {
        let (folder, _s, detector, store) = setup(Strategy::Prompt);
        std::fs::write(folder.path().join("a.txt"), b"local edit").unwrap();
        store.put(
            folder.path(),
            baseline("a.txt", &hash_bytes(b"old")),
        );

        let remote = remote(&hash_bytes(b"remote edit"));
        let first = detector.detect(folder.path(), "a.txt", &remote).unwrap();
        let second = detector.detect(folder.path(), "a.txt", &remote).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.local.hash, second.local.hash);
        assert_eq!(first.remote, second.remote);
    }

    #[test]
    fn newest_wins_prefers_later_mtime() {
        let (folder, _s, detector, store) = setup(Strategy::NewestWins);
        std::fs::write(folder.path().join("a.txt"), b"local edit").unwrap();
        store.put(
            folder.path(),
            baseline("a.txt", &hash_bytes(b"old")),
        );

        let newer_remote = ConflictFile {
            size: 2,
            mod_time: Utc::now() + chrono::Duration::hours(1),
            hash: hash_bytes(b"remote edit"),
            device_name: "Beta".into(),
        };
        let conflict = detector
            .detect(folder.path(), "a.txt", &newer_remote)
            .unwrap();

        let resolution = detector.auto_resolve(&conflict).unwrap();
        assert_eq!(resolution, Resolution::KeepRemote);
        assert!(!detector.has_open());
    }

    #[test]
    fn newest_wins_tie_breaks_toward_local() {
        let (folder, _s, detector, store) = setup(Strategy::NewestWins);
        std::fs::write(folder.path().join("a.txt"), b"local edit").unwrap();
        store.put(
            folder.path(),
            baseline("a.txt", &hash_bytes(b"old")),
        );

        let mut conflict = detector
            .detect(folder.path(), "a.txt", &remote(&hash_bytes(b"remote edit")))
            .unwrap();
        conflict.remote.mod_time = conflict.local.mod_time;

        let resolution = detector.auto_resolve(&conflict).unwrap();
        assert_eq!(resolution, Resolution::KeepLocal);
    }

    #[test]
    fn keep_both_renames_local_aside() {
        let (folder, _s, detector, store) = setup(Strategy::KeepBoth);
        std::fs::write(folder.path().join("c.txt"), b"local edit").unwrap();
        store.put(
            folder.path(),
            baseline("c.txt", &hash_bytes(b"old")),
        );

        let conflict = detector
            .detect(folder.path(), "c.txt", &remote(&hash_bytes(b"remote edit")))
            .unwrap();
        let resolution = detector.auto_resolve(&conflict).unwrap();
        assert_eq!(resolution, Resolution::KeepBoth);

        // Original is gone, the renamed copy holds the local bytes.
        assert!(!folder.path().join("c.txt").exists());
        let renamed: Vec<_> = std::fs::read_dir(folder.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("c_Alpha_conflict_"))
            .collect();
        assert_eq!(renamed.len(), 1);
        assert!(renamed[0].ends_with(".txt"));
        assert_eq!(
            std::fs::read(folder.path().join(&renamed[0])).unwrap(),
            b"local edit"
        );
    }

    #[test]
    fn prompt_leaves_conflict_open() {
        let (folder, _s, detector, store) = setup(Strategy::Prompt);
        std::fs::write(folder.path().join("a.txt"), b"local edit").unwrap();
        store.put(
            folder.path(),
            baseline("a.txt", &hash_bytes(b"old")),
        );

        let conflict = detector
            .detect(folder.path(), "a.txt", &remote(&hash_bytes(b"remote edit")))
            .unwrap();
        let resolution = detector.auto_resolve(&conflict).unwrap();

        assert_eq!(resolution, Resolution::Skip);
        assert!(detector.has_open());
        // The file was not touched.
        assert_eq!(
            std::fs::read(folder.path().join("a.txt")).unwrap(),
            b"local edit"
        );
    }

    #[test]
    fn resolve_by_id_closes_conflict() {
        let (folder, _s, detector, _store) = setup(Strategy::Prompt);
        std::fs::write(folder.path().join("a.txt"), b"local").unwrap();

        let conflict = detector
            .detect(folder.path(), "a.txt", &remote(&hash_bytes(b"remote")))
            .unwrap();
        detector
            .resolve_by_id(&conflict.id, Resolution::KeepLocal)
            .unwrap();

        assert!(!detector.has_open());
        assert!(matches!(
            detector.resolve_by_id(&conflict.id, Resolution::KeepLocal),
            Err(ConflictError::NotFound { .. })
        ));
    }
}
