//! Daemon command - run the sync node until interrupted.

use std::sync::Arc;

use anyhow::{Context, Result};
use lansync_node::{
    Config, ConnectionManager, Discovery, Engine, Paths, PeerEvent, Watcher,
};
use tokio_util::sync::CancellationToken;

/// Run the daemon: listener, watcher, discovery, and engine.
pub async fn run(paths: &Paths) -> Result<()> {
    let config = Arc::new(Config::load(paths).context("Failed to load configuration")?);
    if !config.sync.enabled {
        tracing::info!("Sync is disabled in the configuration; nothing to do");
        return Ok(());
    }

    tracing::info!("Starting lansync (device: {})", config.device.name);
    let cancel = CancellationToken::new();

    // Listener and session management.
    let (manager, net_events) = ConnectionManager::new(cancel.clone());
    manager
        .listen(config.network.port)
        .await
        .context("Failed to start listener")?;

    // Watcher over every enabled folder. A folder that cannot be watched
    // is logged and skipped; the daemon still serves the rest.
    let filter = config.path_filter().context("Invalid ignore patterns")?;
    let (watcher, file_events) = Watcher::new(filter, cancel.clone())?;
    for folder in config.enabled_folders() {
        if let Err(err) = watcher.add_folder(&folder.path) {
            tracing::error!("Failed to watch {}: {}", folder.path.display(), err);
        }
    }

    // Discovery; every newly found peer is dialed.
    let (discovery, mut peer_events) = Discovery::new(
        config.device.name.clone(),
        config.network.port,
        config.network.use_discovery,
        config.network.manual_peers.clone(),
        cancel.clone(),
    );
    discovery.start().await.context("Failed to start discovery")?;

    {
        let manager = manager.clone();
        let dial_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = dial_cancel.cancelled() => return,
                    event = peer_events.recv() => event,
                };
                match event {
                    Some(PeerEvent::Found(peer)) => {
                        let manager = manager.clone();
                        tokio::spawn(async move {
                            if let Err(err) = manager.connect(&peer.address()).await {
                                tracing::error!(
                                    "Failed to connect to peer {}: {}",
                                    peer.name,
                                    err
                                );
                            }
                        });
                    }
                    Some(PeerEvent::Lost(peer)) => {
                        tracing::info!("Peer lost: {}", peer.name);
                    }
                    None => return,
                }
            }
        });
    }

    // The engine pump; it saves state when the loop ends.
    let engine = Engine::new(config.clone(), paths, manager.clone(), cancel.clone())?;
    let engine_task = tokio::spawn(engine.run(file_events, net_events));

    tracing::info!("Daemon running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    tracing::info!("Shutting down");

    // Cancel the root, close sessions, join the engine (which saves
    // state), then tear the watcher down.
    cancel.cancel();
    discovery.stop();
    manager.shutdown().await;
    let _ = engine_task.await;
    drop(watcher);

    Ok(())
}
