//! Per-user directory layout.
//!
//! Constructed once at startup and passed to every component that touches
//! the filesystem outside the synced folders.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Resolved locations of the config file and the state directory.
#[derive(Debug, Clone)]
pub struct Paths {
    /// Directory holding the config file.
    pub config_dir: PathBuf,
    /// The TOML configuration file.
    pub config_file: PathBuf,
    /// Directory holding per-folder state files.
    pub state_dir: PathBuf,
}

impl Paths {
    /// Resolve the platform-default locations for the current user.
    pub fn resolve() -> Result<Self, ConfigError> {
        let dirs = directories::ProjectDirs::from("io", "lansync", "lansync")
            .ok_or(ConfigError::NoHomeDirectory)?;
        Ok(Self::in_dir(dirs.config_dir().to_path_buf()))
    }

    /// Lay out config and state under one root directory.
    ///
    /// Used by tests and by the `--config` override.
    pub fn in_dir(root: PathBuf) -> Self {
        Self {
            config_file: root.join("config.toml"),
            state_dir: root.join("state"),
            config_dir: root,
        }
    }
}
