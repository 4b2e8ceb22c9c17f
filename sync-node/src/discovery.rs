//! Peer discovery: mDNS announcements and browsing, manual peers, and a
//! health loop that ages silent peers out.
//!
//! Browsing runs in repeated cycles with a fresh receiver each time; the
//! underlying multicast library has been seen closing channels at odd
//! moments, so a cycle ending early (or panicking) is treated as normal
//! termination of that cycle, never of the loop.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::parse_host_port;
use crate::error::DiscoveryError;

/// mDNS service type announced and browsed.
pub const SERVICE_TYPE: &str = "_mac-profile-sync._tcp.local.";

/// How long one browse cycle listens for responses.
const BROWSE_WINDOW: Duration = Duration::from_secs(5);

/// Pause between browse cycles.
const BROWSE_PAUSE: Duration = Duration::from_secs(10);

/// Interval of the peer health check.
const HEALTH_TICK: Duration = Duration::from_secs(30);

/// Non-manual peers silent for longer than this are evicted.
const PEER_TIMEOUT: Duration = Duration::from_secs(120);

type PeerMap = Arc<RwLock<HashMap<String, Peer>>>;

/// A known remote participant.
#[derive(Debug, Clone)]
pub struct Peer {
    /// Stable id: the mDNS instance name, or `manual-<host:port>`.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Advertised hostname.
    pub host: String,
    /// Advertised port.
    pub port: u16,
    /// Resolved addresses.
    pub addrs: Vec<IpAddr>,
    /// When the peer was last seen.
    pub last_seen: Instant,
    /// Manual peers come from config and never age out.
    pub manual: bool,
}

impl Peer {
    /// The best address to dial, preferring IPv4 when both families are
    /// known.
    pub fn address(&self) -> String {
        if let Some(v4) = self.addrs.iter().find(|a| a.is_ipv4()) {
            return format!("{}:{}", v4, self.port);
        }
        if let Some(v6) = self.addrs.first() {
            return format!("[{}]:{}", v6, self.port);
        }
        format!("{}:{}", self.host, self.port)
    }
}

/// Peer arrival and departure notifications.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A previously unknown peer appeared.
    Found(Peer),
    /// A peer was evicted by the health loop.
    Lost(Peer),
}

/// Maintains the live peer registry.
pub struct Discovery {
    device_name: String,
    port: u16,
    use_discovery: bool,
    manual_peers: Vec<String>,
    peers: PeerMap,
    daemon: Mutex<Option<ServiceDaemon>>,
    events: mpsc::Sender<PeerEvent>,
    cancel: CancellationToken,
}

impl Discovery {
    /// Create the discovery service and its event stream.
    pub fn new(
        device_name: String,
        port: u16,
        use_discovery: bool,
        manual_peers: Vec<String>,
        cancel: CancellationToken,
    ) -> (Self, mpsc::Receiver<PeerEvent>) {
        let (events, events_rx) = mpsc::channel(64);
        (
            Self {
                device_name,
                port,
                use_discovery,
                manual_peers,
                peers: Arc::new(RwLock::new(HashMap::new())),
                daemon: Mutex::new(None),
                events,
                cancel,
            },
            events_rx,
        )
    }

    /// Register this device, start browsing, add manual peers, and start
    /// the health loop.
    pub async fn start(&self) -> Result<(), DiscoveryError> {
        if self.use_discovery {
            let daemon = ServiceDaemon::new()?;
            self.register(&daemon)?;
            *self.daemon.lock() = Some(daemon.clone());

            tokio::spawn(browse_loop(
                daemon,
                self.device_name.clone(),
                self.peers.clone(),
                self.events.clone(),
                self.cancel.clone(),
            ));
        }

        for address in self.manual_peers.clone() {
            self.add_manual_peer(&address).await;
        }

        tokio::spawn(health_loop(
            self.peers.clone(),
            self.events.clone(),
            self.cancel.clone(),
        ));

        Ok(())
    }

    /// Unregister and shut the mDNS daemon down.
    pub fn stop(&self) {
        if let Some(daemon) = self.daemon.lock().take() {
            let fullname = format!("{}.{}", self.device_name, SERVICE_TYPE);
            if let Err(err) = daemon.unregister(&fullname) {
                tracing::debug!("mDNS unregister failed: {}", err);
            }
            if let Err(err) = daemon.shutdown() {
                tracing::debug!("mDNS shutdown failed: {}", err);
            }
        }
    }

    /// All currently known peers.
    pub fn peers(&self) -> Vec<Peer> {
        self.peers.read().values().cloned().collect()
    }

    /// Look up one peer by id.
    pub fn get_peer(&self, id: &str) -> Option<Peer> {
        self.peers.read().get(id).cloned()
    }

    /// Register a manual peer from config. Invalid addresses are logged
    /// and skipped.
    pub async fn add_manual_peer(&self, address: &str) {
        let Some((host, port)) = parse_host_port(address) else {
            tracing::error!("Invalid manual peer address {:?}", address);
            return;
        };

        let addrs = match tokio::net::lookup_host(address).await {
            Ok(resolved) => resolved.map(|a| a.ip()).collect(),
            Err(err) => {
                tracing::debug!("Failed to resolve manual peer {}: {}", address, err);
                Vec::new()
            }
        };

        let peer = Peer {
            id: format!("manual-{address}"),
            name: host.clone(),
            host,
            port,
            addrs,
            last_seen: Instant::now(),
            manual: true,
        };

        self.peers.write().insert(peer.id.clone(), peer.clone());
        tracing::info!("Added manual peer {} at {}", peer.name, peer.address());
        let _ = self.events.send(PeerEvent::Found(peer)).await;
    }

    fn register(&self, daemon: &ServiceDaemon) -> Result<(), DiscoveryError> {
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| self.device_name.clone());

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            &self.device_name,
            &format!("{host}.local."),
            "",
            self.port,
            &[("version", "1")][..],
        )?
        .enable_addr_auto();

        daemon.register(service)?;
        tracing::info!(
            "mDNS service registered: {} on port {}",
            self.device_name,
            self.port
        );
        Ok(())
    }
}

/// Browse in 5-second cycles separated by a 10-second pause, with a
/// fresh receiver per cycle.
async fn browse_loop(
    daemon: ServiceDaemon,
    device_name: String,
    peers: PeerMap,
    events: mpsc::Sender<PeerEvent>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        let cycle = browse_cycle(&daemon, &device_name, &peers, &events, &cancel);
        if let Err(panic) = std::panic::AssertUnwindSafe(cycle).catch_unwind().await {
            let reason = panic
                .downcast_ref::<&str>()
                .map(|s| (*s).to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown".to_string());
            tracing::debug!("Recovered from mDNS browse panic: {}", reason);
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(BROWSE_PAUSE) => {}
        }
    }
}

async fn browse_cycle(
    daemon: &ServiceDaemon,
    device_name: &str,
    peers: &PeerMap,
    events: &mpsc::Sender<PeerEvent>,
    cancel: &CancellationToken,
) {
    let receiver = match daemon.browse(SERVICE_TYPE) {
        Ok(receiver) => receiver,
        Err(err) => {
            tracing::error!("Failed to start mDNS browse: {}", err);
            return;
        }
    };

    let deadline = tokio::time::Instant::now() + BROWSE_WINDOW;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep_until(deadline) => break,
            event = receiver.recv_async() => match event {
                Ok(ServiceEvent::ServiceResolved(info)) => {
                    handle_resolved(device_name, peers, events, &info).await;
                }
                Ok(_) => {}
                // Channel closed; the cycle is over.
                Err(_) => break,
            }
        }
    }

    if let Err(err) = daemon.stop_browse(SERVICE_TYPE) {
        tracing::debug!("Failed to stop mDNS browse: {}", err);
    }
}

async fn handle_resolved(
    device_name: &str,
    peers: &PeerMap,
    events: &mpsc::Sender<PeerEvent>,
    info: &ServiceInfo,
) {
    let instance = info
        .get_fullname()
        .strip_suffix(&format!(".{SERVICE_TYPE}"))
        .unwrap_or(info.get_fullname())
        .to_string();

    // Our own announcement comes back too.
    if instance == device_name {
        return;
    }

    let peer = Peer {
        id: instance.clone(),
        name: instance,
        host: info.get_hostname().to_string(),
        port: info.get_port(),
        addrs: info.get_addresses().iter().copied().collect(),
        last_seen: Instant::now(),
        manual: false,
    };

    let newly_found = {
        let mut peers = peers.write();
        let existed = peers.contains_key(&peer.id);
        peers.insert(peer.id.clone(), peer.clone());
        !existed
    };

    if newly_found {
        tracing::info!("Discovered new peer {} at {}", peer.name, peer.address());
        let _ = events.send(PeerEvent::Found(peer)).await;
    }
}

/// Tick every 30 seconds, evicting non-manual peers not seen for two
/// minutes.
async fn health_loop(peers: PeerMap, events: mpsc::Sender<PeerEvent>, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(HEALTH_TICK);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick of a tokio interval fires immediately.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = ticker.tick() => {}
        }

        for peer in evict_stale(&peers) {
            tracing::info!("Peer timed out: {}", peer.name);
            let _ = events.send(PeerEvent::Lost(peer)).await;
        }
    }
}

/// Remove non-manual peers that have been silent past the timeout.
fn evict_stale(peers: &PeerMap) -> Vec<Peer> {
    let mut peers = peers.write();
    let stale: Vec<String> = peers
        .values()
        .filter(|p| !p.manual && p.last_seen.elapsed() > PEER_TIMEOUT)
        .map(|p| p.id.clone())
        .collect();
    stale.iter().filter_map(|id| peers.remove(id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn discovery() -> (Discovery, mpsc::Receiver<PeerEvent>) {
        Discovery::new(
            "Alpha".into(),
            9876,
            false,
            Vec::new(),
            CancellationToken::new(),
        )
    }

    fn peer(id: &str, manual: bool, last_seen: Instant) -> Peer {
        Peer {
            id: id.into(),
            name: id.into(),
            host: "box.local.".into(),
            port: 9876,
            addrs: vec![],
            last_seen,
            manual,
        }
    }

    #[tokio::test]
    async fn manual_peer_registers_under_manual_id() {
        let (discovery, mut events) = discovery();
        discovery.add_manual_peer("127.0.0.1:9999").await;

        let found = discovery.get_peer("manual-127.0.0.1:9999").unwrap();
        assert!(found.manual);
        assert_eq!(found.port, 9999);
        assert_eq!(found.address(), "127.0.0.1:9999");

        match events.recv().await.unwrap() {
            PeerEvent::Found(p) => assert_eq!(p.id, "manual-127.0.0.1:9999"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn invalid_manual_peer_is_skipped() {
        let (discovery, _events) = discovery();
        discovery.add_manual_peer("no-port-here").await;
        assert!(discovery.peers().is_empty());
    }

    #[tokio::test]
    async fn stale_peers_age_out_but_manual_survive() {
        let (discovery, _events) = discovery();
        // A monotonic clock younger than the timeout cannot express a
        // stale peer; skip on such hosts.
        let Some(long_ago) = Instant::now().checked_sub(PEER_TIMEOUT + Duration::from_secs(1))
        else {
            return;
        };

        discovery
            .peers
            .write()
            .insert("Beta".into(), peer("Beta", false, long_ago));
        discovery
            .peers
            .write()
            .insert("manual-x:1".into(), peer("manual-x:1", true, long_ago));
        discovery
            .peers
            .write()
            .insert("Gamma".into(), peer("Gamma", false, Instant::now()));

        let expired = evict_stale(&discovery.peers);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "Beta");

        let remaining: Vec<String> = discovery.peers().into_iter().map(|p| p.id).collect();
        assert!(remaining.contains(&"manual-x:1".to_string()));
        assert!(remaining.contains(&"Gamma".to_string()));
        assert!(!remaining.contains(&"Beta".to_string()));
    }

    #[test]
    fn address_prefers_ipv4() {
        let mut p = peer("Beta", false, Instant::now());
        p.addrs = vec![
            "fe80::1".parse().unwrap(),
            "192.168.1.20".parse().unwrap(),
        ];
        assert_eq!(p.address(), "192.168.1.20:9876");

        p.addrs = vec!["fe80::1".parse().unwrap()];
        assert_eq!(p.address(), "[fe80::1]:9876");

        p.addrs = vec![];
        assert_eq!(p.address(), "box.local.:9876");
    }
}
