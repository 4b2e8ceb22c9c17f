//! Folder management commands.

use std::path::Path;

use anyhow::{Context, Result};
use lansync_core::StateStore;
use lansync_node::config::expand_home;
use lansync_node::{Config, Paths};

/// Register a folder for synchronization and persist the config.
pub fn add(paths: &Paths, path: &Path) -> Result<()> {
    let mut config = Config::load(paths).context("Failed to load configuration")?;
    config.add_folder(path)?;
    config.save(paths).context("Failed to save configuration")?;

    println!("Added folder: {}", path.display());
    Ok(())
}

/// Deregister a folder, drop its persisted baselines, and persist the
/// config.
pub fn remove(paths: &Paths, path: &Path) -> Result<()> {
    let mut config = Config::load(paths).context("Failed to load configuration")?;
    config.remove_folder(path)?;
    config.save(paths).context("Failed to save configuration")?;

    // Baselines for a folder that no longer syncs are stale; drop them.
    let store = StateStore::new(paths.state_dir.clone());
    store.clear_folder(&expand_home(path));

    println!("Removed folder: {}", path.display());
    Ok(())
}
