//! Peers command - watch the local network for participants.

use anyhow::{Context, Result};
use lansync_node::{Config, Discovery, Paths, PeerEvent};
use tokio_util::sync::CancellationToken;

/// Browse for peers and print arrivals until interrupted.
pub async fn run(paths: &Paths) -> Result<()> {
    let config = Config::load(paths).context("Failed to load configuration")?;
    let cancel = CancellationToken::new();

    let (discovery, mut events) = Discovery::new(
        config.device.name.clone(),
        config.network.port,
        config.network.use_discovery,
        config.network.manual_peers.clone(),
        cancel.clone(),
    );
    discovery.start().await.context("Failed to start discovery")?;

    println!("Searching for peers... press Ctrl+C to stop.");
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Some(PeerEvent::Found(peer)) => {
                    println!("  found: {} ({})", peer.name, peer.address());
                }
                Some(PeerEvent::Lost(peer)) => {
                    println!("  lost:  {}", peer.name);
                }
                None => break,
            }
        }
    }

    cancel.cancel();
    discovery.stop();
    Ok(())
}
