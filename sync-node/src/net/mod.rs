//! Peer connection management: TCP accept and dial, session ownership,
//! and broadcast.
//!
//! The manager owns every session transport; everything else sees only
//! [`PeerSession`] handles and [`NetEvent`]s. Inbound and outbound
//! sessions behave identically after establishment.

mod session;

pub use session::{PeerSession, SessionDirection, READ_TIMEOUT, WRITE_TIMEOUT};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use lansync_types::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use session::run_read_loop;

/// Dial deadline for outbound connections.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

type SessionMap = Arc<RwLock<HashMap<String, PeerSession>>>;

/// Events surfaced to the engine.
#[derive(Debug)]
pub enum NetEvent {
    /// A session was established (either direction).
    SessionUp(PeerSession),
    /// A session ended and was removed.
    SessionDown {
        /// The closed session's id.
        id: String,
    },
    /// A frame arrived on a session.
    Frame {
        /// The session the frame arrived on.
        session: PeerSession,
        /// The decoded message.
        message: Message,
    },
}

/// Owns all peer sessions and the listening socket.
pub struct ConnectionManager {
    sessions: SessionMap,
    events: mpsc::Sender<NetEvent>,
    cancel: CancellationToken,
}

impl ConnectionManager {
    /// Create the manager and the event stream consumed by the engine.
    pub fn new(cancel: CancellationToken) -> (Arc<Self>, mpsc::Receiver<NetEvent>) {
        let (events, events_rx) = mpsc::channel(256);
        (
            Arc::new(Self {
                sessions: Arc::new(RwLock::new(HashMap::new())),
                events,
                cancel,
            }),
            events_rx,
        )
    }

    /// Bind the TCP listener and start accepting peers.
    ///
    /// Returns the bound port (useful with port 0 in tests).
    pub async fn listen(&self, port: u16) -> Result<u16, TransportError> {
        let listener = TcpListener::bind(("0.0.0.0", port)).await?;
        let bound = listener.local_addr()?.port();
        tracing::info!("Listening on port {}", bound);

        let sessions = self.sessions.clone();
        let events = self.events.clone();
        let cancel = self.cancel.clone();
        tokio::spawn(async move {
            loop {
                let accepted = tokio::select! {
                    _ = cancel.cancelled() => return,
                    accepted = listener.accept() => accepted,
                };

                match accepted {
                    Ok((stream, addr)) => {
                        attach(
                            &sessions,
                            &events,
                            &cancel,
                            stream,
                            addr.to_string(),
                            SessionDirection::Inbound,
                        )
                        .await;
                    }
                    Err(err) => {
                        tracing::error!("Failed to accept connection: {}", err);
                    }
                }
            }
        });
        Ok(bound)
    }

    /// Dial a peer, de-duplicating by address.
    ///
    /// An existing session for the address is returned as-is.
    pub async fn connect(&self, address: &str) -> Result<PeerSession, TransportError> {
        if let Some(existing) = self.sessions.read().await.get(address) {
            return Ok(existing.clone());
        }

        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(address))
            .await
            .map_err(|_| TransportError::ConnectTimeout {
                address: address.to_string(),
                seconds: CONNECT_TIMEOUT.as_secs(),
            })??;

        tracing::info!("Connected to peer at {}", address);
        Ok(attach(
            &self.sessions,
            &self.events,
            &self.cancel,
            stream,
            address.to_string(),
            SessionDirection::Outbound,
        )
        .await)
    }

    /// Send a message to every open session.
    ///
    /// Handles are collected under the read lock, which is released before
    /// any send. Per-session failures are logged and do not abort the
    /// broadcast.
    pub async fn broadcast(&self, message: &Message) {
        let handles: Vec<PeerSession> =
            { self.sessions.read().await.values().cloned().collect() };

        for session in handles {
            if let Err(err) = session.send(message).await {
                tracing::error!("Broadcast to {} failed: {}", session.id(), err);
            }
        }
    }

    /// Handles to all open sessions.
    pub async fn sessions(&self) -> Vec<PeerSession> {
        self.sessions.read().await.values().cloned().collect()
    }

    /// Number of open sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether a session for this address is open.
    pub async fn is_connected(&self, address: &str) -> bool {
        self.sessions.read().await.contains_key(address)
    }

    /// Close one session by id. The read-loop cleanup removes it from the
    /// map and emits [`NetEvent::SessionDown`].
    pub async fn disconnect(&self, id: &str) {
        if let Some(session) = self.sessions.read().await.get(id) {
            session.close();
        }
    }

    /// Close every session.
    pub async fn shutdown(&self) {
        for session in self.sessions.read().await.values() {
            session.close();
        }
    }
}

/// Register a stream as a session and start its read loop.
///
/// The read-loop task owns cleanup: on exit it closes the session,
/// removes it from the map, and emits [`NetEvent::SessionDown`].
async fn attach(
    sessions: &SessionMap,
    events: &mpsc::Sender<NetEvent>,
    cancel: &CancellationToken,
    stream: TcpStream,
    id: String,
    direction: SessionDirection,
) -> PeerSession {
    if let Err(err) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY for {}: {}", id, err);
    }

    let (reader, writer) = stream.into_split();
    let session = PeerSession::new(id.clone(), direction, Box::new(writer), cancel.child_token());

    sessions.write().await.insert(id.clone(), session.clone());
    tracing::info!("Session established: {} ({:?})", id, direction);

    let _ = events.send(NetEvent::SessionUp(session.clone())).await;

    let sessions = sessions.clone();
    let events = events.clone();
    let handle = session.clone();
    tokio::spawn(async move {
        run_read_loop(reader, handle.clone(), events.clone()).await;

        handle.close();
        sessions.write().await.remove(handle.id());
        let _ = events
            .send(NetEvent::SessionDown {
                id: handle.id().to_string(),
            })
            .await;
        tracing::info!("Session closed: {}", handle.id());
    });

    session
}

#[cfg(test)]
mod tests {
    use super::*;
    use lansync_types::{Hello, MessageKind};

    async fn pair() -> (
        Arc<ConnectionManager>,
        mpsc::Receiver<NetEvent>,
        Arc<ConnectionManager>,
        mpsc::Receiver<NetEvent>,
        CancellationToken,
    ) {
        let cancel = CancellationToken::new();
        let (server, server_rx) = ConnectionManager::new(cancel.clone());
        let (client, client_rx) = ConnectionManager::new(cancel.clone());

        let port = server.listen(0).await.unwrap();
        client
            .connect(&format!("127.0.0.1:{port}"))
            .await
            .unwrap();

        (server, server_rx, client, client_rx, cancel)
    }

    #[tokio::test]
    async fn accept_and_dial_produce_sessions_on_both_sides() {
        let (server, mut server_rx, client, mut client_rx, _cancel) = pair().await;

        let up = client_rx.recv().await.unwrap();
        assert!(matches!(up, NetEvent::SessionUp(_)));
        let up = server_rx.recv().await.unwrap();
        assert!(matches!(up, NetEvent::SessionUp(_)));

        assert_eq!(server.session_count().await, 1);
        assert_eq!(client.session_count().await, 1);
    }

    #[tokio::test]
    async fn connect_deduplicates_by_address() {
        let cancel = CancellationToken::new();
        let (server, _server_rx) = ConnectionManager::new(cancel.clone());
        let (client, _client_rx) = ConnectionManager::new(cancel.clone());

        let port = server.listen(0).await.unwrap();
        let address = format!("127.0.0.1:{port}");

        let first = client.connect(&address).await.unwrap();
        let second = client.connect(&address).await.unwrap();

        assert_eq!(first.id(), second.id());
        assert_eq!(client.session_count().await, 1);
        assert!(client.is_connected(&address).await);
    }

    #[tokio::test]
    async fn frames_cross_the_wire() {
        let (_server, mut server_rx, client, mut client_rx, _cancel) = pair().await;

        // Drain the SessionUp on the client, keep its handle.
        let client_session = match client_rx.recv().await.unwrap() {
            NetEvent::SessionUp(session) => session,
            other => panic!("unexpected event: {other:?}"),
        };
        let _ = server_rx.recv().await.unwrap(); // server-side SessionUp

        let hello = Hello {
            device_name: "Alpha".into(),
            device_id: "Alpha".into(),
            version: "1.0".into(),
        };
        client_session
            .send(&Message::new(MessageKind::Hello, &hello).unwrap())
            .await
            .unwrap();

        match server_rx.recv().await.unwrap() {
            NetEvent::Frame { message, session } => {
                assert_eq!(message.kind, MessageKind::Hello);
                let decoded: Hello = message.decode_payload().unwrap();
                assert_eq!(decoded.device_name, "Alpha");
                assert!(!session.is_closed());
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let _ = client;
    }

    #[tokio::test]
    async fn broadcast_reaches_connected_peer() {
        let (server, mut server_rx, _client, mut client_rx, _cancel) = pair().await;

        let _ = client_rx.recv().await.unwrap();
        let _ = server_rx.recv().await.unwrap();

        server.broadcast(&Message::control(MessageKind::Pong)).await;

        match client_rx.recv().await.unwrap() {
            NetEvent::Frame { message, .. } => assert_eq!(message.kind, MessageKind::Pong),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_emits_session_down() {
        let (server, mut server_rx, _client, mut client_rx, _cancel) = pair().await;

        let _ = client_rx.recv().await.unwrap();
        let server_session = match server_rx.recv().await.unwrap() {
            NetEvent::SessionUp(session) => session,
            other => panic!("unexpected event: {other:?}"),
        };

        server.disconnect(server_session.id()).await;

        match server_rx.recv().await.unwrap() {
            NetEvent::SessionDown { id } => assert_eq!(id, server_session.id()),
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(server.session_count().await, 0);
    }
}
