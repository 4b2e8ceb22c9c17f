//! # lansync-core
//!
//! State tracking and sync decision logic for lansync, independent of the
//! network layer:
//!
//! - [`StateStore`] - persistent per-file baselines enabling three-way
//!   change detection
//! - [`ConflictDetector`] - baseline-driven conflict detection and
//!   policy-driven resolution
//! - [`PathFilter`] - ignore-glob and exclude-prefix matching
//! - [`fsutil`] - file hashing, metadata capture, and conflict filenames
//!
//! The baseline stored for (folder, relative path) is the content last
//! known to exist identically on both sides after a successful exchange.
//! Comparing local and remote hashes against it distinguishes "remote
//! changed since last sync" from "both sides changed".

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod conflict;
pub mod error;
pub mod filter;
pub mod fsutil;
pub mod state;

pub use conflict::{Conflict, ConflictDetector, ConflictFile, Resolution, Strategy};
pub use error::{ConflictError, StateError};
pub use filter::{default_ignore_patterns, PathFilter};
pub use fsutil::{conflict_file_name, ensure_dir, file_meta, hash_bytes, hash_file, FileMeta};
pub use state::{FileRecord, FolderState, StateStore};
