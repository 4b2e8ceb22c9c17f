//! Error types for lansync-node.

use lansync_core::StateError;
use lansync_types::ProtocolError;

use crate::config::ConfigError;

/// Top-level error for node construction and startup.
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// Configuration error; fatal at startup.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// State persistence error.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Session transport error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Filesystem watcher error.
    #[error("watch error: {0}")]
    Watch(#[from] notify::Error),

    /// Peer discovery error.
    #[error("discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
}

/// Errors on one peer session's transport.
///
/// Any of these terminates only the owning session; the daemon keeps
/// running and the peer's address stays known for future dial attempts.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Dial did not complete within the connect deadline.
    #[error("connect timed out after {seconds}s: {address}")]
    ConnectTimeout {
        /// The dialed address.
        address: String,
        /// The deadline that elapsed.
        seconds: u64,
    },

    /// Write did not complete within the write deadline.
    #[error("write timed out after {seconds}s")]
    WriteTimeout {
        /// The deadline that elapsed.
        seconds: u64,
    },

    /// Framing or encoding failed.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Socket-level I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the mDNS discovery layer.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    /// The mDNS daemon or a registration/browse call failed.
    #[error("mDNS error: {0}")]
    Mdns(#[from] mdns_sd::Error),
}
