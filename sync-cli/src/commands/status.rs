//! Status command - print configuration and folder state.

use anyhow::{Context, Result};
use lansync_node::{Config, Paths};

/// Print the device, network, and folder configuration.
pub fn run(paths: &Paths) -> Result<()> {
    let config = Config::load(paths).context("Failed to load configuration")?;

    println!("lansync status");
    println!("==============");
    println!();
    println!("Device:    {}", config.device.name);
    println!("Port:      {}", config.network.port);
    println!("Discovery: {}", config.network.use_discovery);
    println!("Direction: {}", config.sync.direction);
    println!("Conflicts: {}", config.sync.conflict_resolution);
    println!();

    if config.folders.is_empty() {
        println!("No folders configured. Add one with `lansync add <path>`.");
        return Ok(());
    }

    println!("Synced folders:");
    for folder in &config.folders {
        let state = if folder.enabled { "enabled" } else { "disabled" };
        println!("  {} ({})", folder.path.display(), state);
    }

    if !config.network.manual_peers.is_empty() {
        println!();
        println!("Manual peers:");
        for peer in &config.network.manual_peers {
            println!("  {peer}");
        }
    }

    Ok(())
}
