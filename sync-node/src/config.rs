//! Daemon configuration.
//!
//! Loaded from a TOML file (default: `config.toml` under the per-user
//! config directory). Missing fields take their defaults; a missing file
//! is created with the full default configuration on first load.

use std::path::{Path, PathBuf};

use lansync_core::{default_ignore_patterns, PathFilter, Strategy};
use serde::{Deserialize, Serialize};

use crate::paths::Paths;

/// Root configuration for the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// This device's identity.
    #[serde(default)]
    pub device: DeviceConfig,
    /// Folders registered for synchronization.
    #[serde(default)]
    pub folders: Vec<FolderSpec>,
    /// Sync behavior.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Network settings.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Device identity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Stable device name, announced to peers. Defaults to the hostname.
    #[serde(default = "default_device_name")]
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
        }
    }
}

/// One directory registered for synchronization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FolderSpec {
    /// Absolute path (`~` is expanded at load time).
    pub path: PathBuf,
    /// Whether the folder currently syncs.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl FolderSpec {
    /// The folder's base name, the identity used for matching across
    /// peers.
    pub fn base_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Sync behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Master gate for the sync daemon.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Which directions this node participates in.
    #[serde(default)]
    pub direction: Direction,
    /// Conflict auto-resolution strategy.
    #[serde(default)]
    pub conflict_resolution: Strategy,
    /// Glob patterns matched against base names.
    #[serde(default = "default_ignore_patterns")]
    pub ignore_patterns: Vec<String>,
    /// Absolute prefixes excluded from synchronization.
    #[serde(default)]
    pub exclude_dirs: Vec<PathBuf>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            direction: Direction::default(),
            conflict_resolution: Strategy::default(),
            ignore_patterns: default_ignore_patterns(),
            exclude_dirs: Vec::new(),
        }
    }
}

/// Per-direction sync policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Send local changes and apply remote ones.
    Bidirectional,
    /// Only send local changes; drop everything inbound.
    SendOnly,
    /// Only apply remote changes; never broadcast local ones.
    ReceiveOnly,
}

impl Default for Direction {
    fn default() -> Self {
        Self::Bidirectional
    }
}

impl Direction {
    /// Whether local changes may be sent to peers.
    pub fn can_send(self) -> bool {
        matches!(self, Self::Bidirectional | Self::SendOnly)
    }

    /// Whether remote changes may be applied locally.
    pub fn can_receive(self) -> bool {
        matches!(self, Self::Bidirectional | Self::ReceiveOnly)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Bidirectional => "bidirectional",
            Self::SendOnly => "send_only",
            Self::ReceiveOnly => "receive_only",
        })
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// TCP listen port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Whether to announce and browse via mDNS.
    #[serde(default = "default_true")]
    pub use_discovery: bool,
    /// Statically configured peers as `host:port`.
    #[serde(default)]
    pub manual_peers: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            use_discovery: true,
            manual_peers: Vec::new(),
        }
    }
}

fn default_device_name() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "lansync-device".to_string())
}

fn default_true() -> bool {
    true
}

fn default_port() -> u16 {
    9876
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            folders: Vec::new(),
            sync: SyncConfig::default(),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    /// Load the configuration, creating a default file if none exists.
    ///
    /// Paths are `~`-expanded and the result is validated.
    pub fn load(paths: &Paths) -> Result<Self, ConfigError> {
        lansync_core::ensure_dir(&paths.config_dir).map_err(|source| ConfigError::Write {
            path: paths.config_dir.clone(),
            source,
        })?;

        if !paths.config_file.exists() {
            let config = Self::default();
            config.save(paths)?;
            return Ok(config);
        }

        let mut config = Self::from_file(&paths.config_file)?;
        config.expand_paths();
        config.validate()?;
        Ok(config)
    }

    /// Parse a configuration file without the create-if-missing behavior.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write the configuration back to its file.
    pub fn save(&self, paths: &Paths) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(&paths.config_file, contents).map_err(|source| ConfigError::Write {
            path: paths.config_file.clone(),
            source,
        })
    }

    /// Check invariants that must hold before the daemon starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.device.name.trim().is_empty() {
            return Err(ConfigError::EmptyDeviceName);
        }
        if self.network.port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        // Folder identity across peers is by base name; two enabled local
        // folders with the same base name would collide.
        let enabled: Vec<&FolderSpec> = self.folders.iter().filter(|f| f.enabled).collect();
        for (i, folder) in enabled.iter().enumerate() {
            for other in &enabled[i + 1..] {
                if folder.base_name() == other.base_name() {
                    return Err(ConfigError::DuplicateFolderName {
                        name: folder.base_name(),
                    });
                }
            }
        }

        for peer in &self.network.manual_peers {
            parse_host_port(peer).ok_or_else(|| ConfigError::InvalidManualPeer {
                address: peer.clone(),
            })?;
        }

        // Compiling the filter surfaces bad globs now instead of at runtime.
        self.path_filter()?;
        Ok(())
    }

    /// Build the compiled path filter from the ignore and exclude lists.
    pub fn path_filter(&self) -> Result<PathFilter, ConfigError> {
        PathFilter::new(&self.sync.ignore_patterns, &self.sync.exclude_dirs)
            .map_err(ConfigError::InvalidIgnorePattern)
    }

    /// The folders that currently sync.
    pub fn enabled_folders(&self) -> impl Iterator<Item = &FolderSpec> {
        self.folders.iter().filter(|f| f.enabled)
    }

    /// Register a new folder for synchronization.
    pub fn add_folder(&mut self, path: &Path) -> Result<(), ConfigError> {
        let expanded = expand_home(path);

        if self.folders.iter().any(|f| f.path == expanded) {
            return Err(ConfigError::FolderAlreadyConfigured { path: expanded });
        }

        let metadata =
            std::fs::metadata(&expanded).map_err(|source| ConfigError::FolderInaccessible {
                path: expanded.clone(),
                source,
            })?;
        if !metadata.is_dir() {
            return Err(ConfigError::NotADirectory { path: expanded });
        }

        self.folders.push(FolderSpec {
            path: expanded,
            enabled: true,
        });
        if let Err(err) = self.validate() {
            self.folders.pop();
            return Err(err);
        }
        Ok(())
    }

    /// Deregister a folder.
    pub fn remove_folder(&mut self, path: &Path) -> Result<(), ConfigError> {
        let expanded = expand_home(path);
        let before = self.folders.len();
        self.folders.retain(|f| f.path != expanded);
        if self.folders.len() == before {
            return Err(ConfigError::FolderNotConfigured { path: expanded });
        }
        Ok(())
    }

    /// Flip a folder's enabled flag.
    pub fn toggle_folder(&mut self, path: &Path) -> Result<bool, ConfigError> {
        let expanded = expand_home(path);
        for folder in &mut self.folders {
            if folder.path == expanded {
                folder.enabled = !folder.enabled;
                return Ok(folder.enabled);
            }
        }
        Err(ConfigError::FolderNotConfigured { path: expanded })
    }

    fn expand_paths(&mut self) {
        for folder in &mut self.folders {
            folder.path = expand_home(&folder.path);
        }
        for dir in &mut self.sync.exclude_dirs {
            *dir = expand_home(dir);
        }
    }
}

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    let Some(home) = directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf()) else {
        return path.to_path_buf();
    };
    match path.to_str() {
        Some("~") => home,
        Some(s) if s.starts_with("~/") => home.join(&s[2..]),
        _ => path.to_path_buf(),
    }
}

/// Parse a `host:port` string, returning `None` when it does not fit.
pub(crate) fn parse_host_port(address: &str) -> Option<(String, u16)> {
    let (host, port) = address.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    if host.is_empty() || port == 0 {
        return None;
    }
    Some((host.to_string(), port))
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Could not determine the user's home directory.
    #[error("could not determine home directory")]
    NoHomeDirectory,

    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the configuration file.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },

    /// Failed to write the configuration file or its directory.
    #[error("failed to write config to {path}: {source}")]
    Write {
        /// The path that failed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to serialize the configuration.
    #[error("failed to serialize config: {0}")]
    Serialize(toml::ser::Error),

    /// The device name is empty.
    #[error("device name must not be empty")]
    EmptyDeviceName,

    /// The listen port is zero.
    #[error("network port must not be 0")]
    InvalidPort,

    /// Two enabled folders share a base name.
    #[error("two enabled folders share the base name {name:?}; folders are matched across peers by base name")]
    DuplicateFolderName {
        /// The colliding base name.
        name: String,
    },

    /// A manual peer entry is not `host:port`.
    #[error("invalid manual peer address {address:?}, expected host:port")]
    InvalidManualPeer {
        /// The offending entry.
        address: String,
    },

    /// An ignore pattern is not a valid glob.
    #[error("invalid ignore pattern: {0}")]
    InvalidIgnorePattern(#[from] glob::PatternError),

    /// A folder path is already configured.
    #[error("folder already configured: {path}")]
    FolderAlreadyConfigured {
        /// The duplicate path.
        path: PathBuf,
    },

    /// A folder path could not be accessed.
    #[error("cannot access folder {path}: {source}")]
    FolderInaccessible {
        /// The inaccessible path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A folder path exists but is not a directory.
    #[error("path is not a directory: {path}")]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// A folder path is not in the configuration.
    #[error("folder not configured: {path}")]
    FolderNotConfigured {
        /// The missing path.
        path: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.network.port, 9876);
        assert!(config.sync.enabled);
        assert_eq!(config.sync.direction, Direction::Bidirectional);
        assert!(config
            .sync
            .ignore_patterns
            .contains(&".DS_Store".to_string()));
    }

    #[test]
    fn missing_fields_use_defaults() {
        let config: Config = toml::from_str(
            r#"
[device]
name = "Alpha"

[[folders]]
path = "/home/a/Shared"
"#,
        )
        .unwrap();

        assert_eq!(config.device.name, "Alpha");
        assert_eq!(config.folders.len(), 1);
        assert!(config.folders[0].enabled);
        assert_eq!(config.network.port, 9876);
        assert!(config.network.use_discovery);
    }

    #[test]
    fn direction_parses_snake_case() {
        let config: Config = toml::from_str(
            r#"
[sync]
direction = "receive_only"
"#,
        )
        .unwrap();
        assert_eq!(config.sync.direction, Direction::ReceiveOnly);
        assert!(!config.sync.direction.can_send());
        assert!(config.sync.direction.can_receive());
    }

    #[test]
    fn duplicate_base_names_rejected() {
        let config: Config = toml::from_str(
            r#"
[[folders]]
path = "/home/a/Shared"

[[folders]]
path = "/mnt/backup/Shared"
"#,
        )
        .unwrap();

        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateFolderName { name }) if name == "Shared"
        ));
    }

    #[test]
    fn duplicate_base_name_allowed_when_disabled() {
        let config: Config = toml::from_str(
            r#"
[[folders]]
path = "/home/a/Shared"

[[folders]]
path = "/mnt/backup/Shared"
enabled = false
"#,
        )
        .unwrap();
        config.validate().unwrap();
    }

    #[test]
    fn bad_manual_peer_rejected() {
        let config: Config = toml::from_str(
            r#"
[network]
manual_peers = ["not-an-address"]
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidManualPeer { .. })
        ));
    }

    #[test]
    fn load_creates_default_file() {
        let dir = tempdir().unwrap();
        let paths = Paths::in_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert!(paths.config_file.exists());
        assert!(config.folders.is_empty());

        // Second load reads the file it just wrote.
        let reloaded = Config::load(&paths).unwrap();
        assert_eq!(reloaded.network.port, config.network.port);
    }

    #[test]
    fn add_remove_toggle_folder() {
        let dir = tempdir().unwrap();
        let folder = dir.path().join("Shared");
        std::fs::create_dir(&folder).unwrap();

        let mut config = Config::default();
        config.add_folder(&folder).unwrap();
        assert!(matches!(
            config.add_folder(&folder),
            Err(ConfigError::FolderAlreadyConfigured { .. })
        ));

        assert!(!config.toggle_folder(&folder).unwrap());
        assert!(config.toggle_folder(&folder).unwrap());

        config.remove_folder(&folder).unwrap();
        assert!(matches!(
            config.remove_folder(&folder),
            Err(ConfigError::FolderNotConfigured { .. })
        ));
    }

    #[test]
    fn add_folder_rejects_files() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        std::fs::write(&file, b"x").unwrap();

        let mut config = Config::default();
        assert!(matches!(
            config.add_folder(&file),
            Err(ConfigError::NotADirectory { .. })
        ));
    }

    #[test]
    fn host_port_parsing() {
        assert_eq!(
            parse_host_port("10.0.0.2:9876"),
            Some(("10.0.0.2".into(), 9876))
        );
        assert_eq!(
            parse_host_port("box.local:9876"),
            Some(("box.local".into(), 9876))
        );
        assert!(parse_host_port("no-port").is_none());
        assert!(parse_host_port(":9876").is_none());
        assert!(parse_host_port("host:0").is_none());
        assert!(parse_host_port("host:notanumber").is_none());
    }
}
