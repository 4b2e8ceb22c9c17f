//! Error types for lansync-core.

use std::path::PathBuf;

/// Errors from state persistence.
///
/// In-memory state stays authoritative when persistence fails; callers log
/// these and carry on.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// Could not create the state directory.
    #[error("failed to create state directory {path}: {source}")]
    CreateDir {
        /// The state directory path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Could not read the state directory or a state file.
    #[error("failed to read state from {path}: {source}")]
    Read {
        /// The path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Could not write a state file.
    #[error("failed to write state file {path}: {source}")]
    Write {
        /// The path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// State serialization failed.
    #[error("state serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from conflict resolution.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    /// Renaming the local file aside for a keep-both resolution failed.
    #[error("failed to rename conflicting file {path}: {source}")]
    Rename {
        /// The file that could not be renamed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// No open conflict with the given id.
    #[error("conflict not found: {id}")]
    NotFound {
        /// The conflict id that was looked up.
        id: String,
    },
}
