//! Per-peer session handles and the session read loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use lansync_types::{read_message, write_message, Message, MessageKind};
use parking_lot::Mutex;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::net::NetEvent;

/// Per-frame read deadline; a silent peer is dropped after this.
pub const READ_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-message write deadline.
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Which side opened the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionDirection {
    /// The peer dialed us.
    Inbound,
    /// We dialed the peer.
    Outbound,
}

#[derive(Debug)]
struct SessionInfo {
    device_name: Option<String>,
    paired: bool,
    last_seen: Instant,
}

/// Cloneable handle to one live peer session.
///
/// The connection manager owns the transport; handles carry only the
/// session id, shared metadata, and the send capability, so the engine
/// never holds a back-pointer into the transport.
#[derive(Clone)]
pub struct PeerSession {
    id: String,
    direction: SessionDirection,
    writer: Arc<tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>>,
    info: Arc<Mutex<SessionInfo>>,
    cancel: CancellationToken,
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("device_name", &self.device_name())
            .finish_non_exhaustive()
    }
}

impl PeerSession {
    /// Create a session handle over any async writer.
    ///
    /// Production sessions wrap the write half of a TCP stream; tests
    /// wrap in-memory pipes.
    pub fn new(
        id: String,
        direction: SessionDirection,
        writer: Box<dyn AsyncWrite + Send + Unpin>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            direction,
            writer: Arc::new(tokio::sync::Mutex::new(writer)),
            info: Arc::new(Mutex::new(SessionInfo {
                device_name: None,
                paired: false,
                last_seen: Instant::now(),
            })),
            cancel,
        }
    }

    /// The session id: the remote address (inbound) or the dialed
    /// address (outbound).
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Which side opened the session.
    pub fn direction(&self) -> SessionDirection {
        self.direction
    }

    /// The peer's device name, once its Hello arrived.
    pub fn device_name(&self) -> Option<String> {
        self.info.lock().device_name.clone()
    }

    /// Record the peer's device name from its Hello.
    pub fn set_device_name(&self, name: &str) {
        self.info.lock().device_name = Some(name.to_string());
    }

    /// Whether the pairing stub has run on this session.
    pub fn is_paired(&self) -> bool {
        self.info.lock().paired
    }

    /// Mark the session paired.
    pub fn set_paired(&self, paired: bool) {
        self.info.lock().paired = paired;
    }

    /// When the last frame arrived.
    pub fn last_seen(&self) -> Instant {
        self.info.lock().last_seen
    }

    fn touch(&self) {
        self.info.lock().last_seen = Instant::now();
    }

    /// Send one message, bounded by the write deadline.
    pub async fn send(&self, message: &Message) -> Result<(), TransportError> {
        let mut writer = self.writer.lock().await;
        tokio::time::timeout(WRITE_TIMEOUT, write_message(&mut **writer, message))
            .await
            .map_err(|_| TransportError::WriteTimeout {
                seconds: WRITE_TIMEOUT.as_secs(),
            })?
            .map_err(TransportError::Protocol)
    }

    /// Ask the read loop to terminate and the session to close.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Whether the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancelled(&self) -> tokio_util::sync::WaitForCancellationFuture<'_> {
        self.cancel.cancelled()
    }
}

/// Read frames until error, deadline, or cancellation.
///
/// Ping is answered with Pong inline; every other frame is forwarded to
/// the engine. Returning ends the session; the caller removes it from the
/// session map.
pub(crate) async fn run_read_loop<R>(
    mut reader: R,
    session: PeerSession,
    events: mpsc::Sender<NetEvent>,
) where
    R: AsyncRead + Send + Unpin,
{
    loop {
        let frame = tokio::select! {
            _ = session.cancelled() => return,
            frame = tokio::time::timeout(READ_TIMEOUT, read_message(&mut reader)) => frame,
        };

        let message = match frame {
            Err(_) => {
                tracing::debug!("Read deadline exceeded for {}", session.id());
                return;
            }
            Ok(Err(err)) => {
                tracing::debug!("Read error from {}: {}", session.id(), err);
                return;
            }
            Ok(Ok(message)) => message,
        };

        session.touch();

        if message.kind == MessageKind::Ping {
            if let Err(err) = session.send(&Message::control(MessageKind::Pong)).await {
                tracing::debug!("Failed to answer ping from {}: {}", session.id(), err);
                return;
            }
            continue;
        }

        let event = NetEvent::Frame {
            session: session.clone(),
            message,
        };
        if events.send(event).await.is_err() {
            // Engine gone; shutting down.
            return;
        }
    }
}
