//! # lansync-node
//!
//! The lansync runtime: everything between the wire format and the CLI.
//!
//! - [`Config`] / [`Paths`] - configuration and per-user directories
//! - [`Watcher`] - recursive filesystem watcher with debounce
//! - [`Discovery`] - mDNS peer discovery plus manual peers and aging
//! - [`ConnectionManager`] / [`PeerSession`] - framed TCP sessions
//! - [`Engine`] - the orchestrator tying events to network traffic
//!
//! ## Task model
//!
//! The daemon runs a watcher pump, one read loop per peer session, a
//! discovery browse loop, a discovery health tick, and the engine event
//! pump. Every task inherits a [`CancellationToken`] rooted at shutdown;
//! no task holds a lock across I/O.
//!
//! [`CancellationToken`]: tokio_util::sync::CancellationToken

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activity;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod net;
pub mod paths;
pub mod watcher;

pub use activity::{Activity, ActivityKind, ActivityLog};
pub use config::{Config, ConfigError, Direction, FolderSpec};
pub use discovery::{Discovery, Peer, PeerEvent};
pub use engine::{Engine, MAX_SYNC_FILE_SIZE};
pub use error::{DiscoveryError, NodeError, TransportError};
pub use net::{ConnectionManager, NetEvent, PeerSession, SessionDirection};
pub use paths::Paths;
pub use watcher::{FileEvent, FileEventKind, Watcher};
