//! Discovery engine: broadcaster, listener and request/reply handling.

use crate::directed;
use crate::error::DiscoveryError;
use crate::messages::{DiscoveredDevice, DiscoveryReply, DiscoveryRequest};
use crate::{DiscoverySink, LocalDevice, PeerKeyLookup};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tether_crypto::aead::AeadKey;
use tether_crypto::verify::now_millis;
use tether_transport::multicast::MulticastChannel;
use tether_transport::packet::{self, Packet, PacketType};
use tether_transport::{MAX_DATAGRAM_SIZE, Transport, lan};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default multicast group.
pub const DEFAULT_MULTICAST_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 77, 88);

/// Default multicast port.
pub const DEFAULT_MULTICAST_PORT: u16 = 52352;

/// Default broadcast interval.
pub const DEFAULT_BROADCAST_INTERVAL: Duration = Duration::from_secs(5);

/// Discovery configuration
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Multicast group address
    pub multicast_group: Ipv4Addr,

    /// Multicast port
    pub multicast_port: u16,

    /// Interface to join the group on (`None` = first private IPv4, else any)
    pub interface: Option<Ipv4Addr>,

    /// Interval between broadcasts
    pub broadcast_interval: Duration,

    /// Drop datagrams whose source is one of our own addresses
    pub ignore_local_sources: bool,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_group: DEFAULT_MULTICAST_GROUP,
            multicast_port: DEFAULT_MULTICAST_PORT,
            interface: None,
            broadcast_interval: DEFAULT_BROADCAST_INTERVAL,
            ignore_local_sources: true,
        }
    }
}

impl DiscoveryConfig {
    /// Group socket address.
    #[must_use]
    pub fn group_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.multicast_group, self.multicast_port)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for a zero port or zero interval.
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if self.multicast_port == 0 {
            return Err(DiscoveryError::InvalidConfig(
                "multicast port must be non-zero".into(),
            ));
        }
        if self.broadcast_interval.is_zero() {
            return Err(DiscoveryError::InvalidConfig(
                "broadcast interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// A running background loop.
struct LoopHandle {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl LoopHandle {
    fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!("discovery loop panicked: {e}");
            }
        }
    }
}

/// Discovery engine.
///
/// Sends all requests and replies through the node's unicast transport, so
/// replies to our broadcasts land on the unicast socket. The node forwards
/// `DISCOVER_REPLY` datagrams it receives there to [`DiscoveryEngine::handle_packet`].
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    device: Arc<dyn LocalDevice>,
    keys: Arc<dyn PeerKeyLookup>,
    sink: Arc<dyn DiscoverySink>,
    transport: Arc<dyn Transport>,
    local_addrs: RwLock<Vec<IpAddr>>,
    broadcaster: Mutex<Option<LoopHandle>>,
    listener: Mutex<Option<LoopHandle>>,
}

impl DiscoveryEngine {
    /// Create an engine. No loops are started.
    #[must_use]
    pub fn new(
        config: DiscoveryConfig,
        device: Arc<dyn LocalDevice>,
        keys: Arc<dyn PeerKeyLookup>,
        sink: Arc<dyn DiscoverySink>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            device,
            keys,
            sink,
            transport,
            local_addrs: RwLock::new(Vec::new()),
            broadcaster: Mutex::new(None),
            listener: Mutex::new(None),
        })
    }

    /// Engine configuration.
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    fn group(&self) -> SocketAddr {
        SocketAddr::V4(self.config.group_addr())
    }

    fn refresh_local_addrs(&self) -> Vec<IpAddr> {
        let addrs = match lan::local_addresses() {
            Ok(addrs) => addrs,
            Err(e) => {
                warn!("could not list local addresses: {e}");
                Vec::new()
            }
        };
        if let Ok(mut guard) = self.local_addrs.write() {
            guard.clone_from(&addrs);
        }
        addrs
    }

    /// Whether a datagram from `ip` should be processed.
    #[must_use]
    pub fn accepts_source(&self, ip: IpAddr) -> bool {
        if !self.config.ignore_local_sources {
            return true;
        }
        match self.local_addrs.read() {
            Ok(local) => !lan::is_local_source(ip, &local),
            Err(_) => !ip.is_loopback(),
        }
    }

    // ------------------------------------------------------------------
    // Broadcasting
    // ------------------------------------------------------------------

    /// Send one generic `DISCOVER` to the group.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the datagram cannot be sent.
    pub async fn broadcast_once(&self) -> Result<(), DiscoveryError> {
        let bytes = packet::encode(PacketType::Discover, &DiscoveryRequest::broadcast())?;
        self.transport.send_to(&bytes, self.group()).await?;
        debug!(group = %self.group(), "sent discovery broadcast");
        Ok(())
    }

    /// Send a directed query for a paired peer.
    ///
    /// # Errors
    ///
    /// Returns an error if sealing or sending fails.
    pub async fn discover_specific(&self, peer_id: &str, key: &AeadKey) -> Result<(), DiscoveryError> {
        let request = DiscoveryRequest {
            from_id: Some(self.device.info().id),
            to_id: Some(directed::seal_target(key, peer_id)?),
        };
        let bytes = packet::encode(PacketType::Discover, &request)?;
        self.transport.send_to(&bytes, self.group()).await?;
        debug!(peer_id, "sent directed discovery query");
        Ok(())
    }

    /// Start the periodic broadcaster. No-op if already running.
    pub async fn start_broadcast(self: &Arc<Self>) {
        let mut slot = self.broadcaster.lock().await;
        if slot.as_ref().is_some_and(LoopHandle::is_running) {
            debug!("broadcaster already running");
            return;
        }

        let token = CancellationToken::new();
        let engine = Arc::clone(self);
        let loop_token = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(engine.config.broadcast_interval);
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = engine.broadcast_once().await {
                            warn!("discovery broadcast failed: {e}");
                        }
                    }
                }
            }
            debug!("broadcaster stopped");
        });

        info!(interval = ?self.config.broadcast_interval, "discovery broadcaster started");
        *slot = Some(LoopHandle { token, task });
    }

    /// Stop the broadcaster if running.
    pub async fn stop_broadcast(&self) {
        let handle = self.broadcaster.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("discovery broadcaster stopped");
        }
    }

    /// Whether the broadcaster is running.
    pub async fn is_broadcasting(&self) -> bool {
        self.broadcaster
            .lock()
            .await
            .as_ref()
            .is_some_and(LoopHandle::is_running)
    }

    // ------------------------------------------------------------------
    // Listening
    // ------------------------------------------------------------------

    /// Join the group and start answering requests. No-op if already running.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the group port cannot be bound or joined.
    pub async fn start_listener(self: &Arc<Self>) -> Result<(), DiscoveryError> {
        let mut slot = self.listener.lock().await;
        if slot.as_ref().is_some_and(LoopHandle::is_running) {
            debug!("listener already running");
            return Ok(());
        }

        let local = self.refresh_local_addrs();
        let interface = self
            .config
            .interface
            .or_else(|| lan::primary_lan_ipv4(&local))
            .unwrap_or(Ipv4Addr::UNSPECIFIED);
        let channel = MulticastChannel::join(self.config.group_addr(), interface)?;

        let token = CancellationToken::new();
        let engine = Arc::clone(self);
        let loop_token = token.clone();
        let task = tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            loop {
                tokio::select! {
                    () = loop_token.cancelled() => break,
                    received = channel.recv_from(&mut buf) => match received {
                        Ok((len, from)) => engine.handle_datagram(&buf[..len], from).await,
                        Err(e) => {
                            warn!("discovery listener receive failed: {e}");
                            tokio::time::sleep(Duration::from_millis(100)).await;
                        }
                    }
                }
            }
            channel.close();
            debug!("listener stopped");
        });

        info!(group = %self.config.group_addr(), %interface, "discovery listener started");
        *slot = Some(LoopHandle { token, task });
        Ok(())
    }

    /// Stop the listener and release the group socket.
    pub async fn stop_listener(&self) {
        let handle = self.listener.lock().await.take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!("discovery listener stopped");
        }
    }

    /// Whether the listener is running.
    pub async fn is_listening(&self) -> bool {
        self.listener
            .lock()
            .await
            .as_ref()
            .is_some_and(LoopHandle::is_running)
    }

    /// Stop both loops.
    pub async fn stop(&self) {
        self.stop_broadcast().await;
        self.stop_listener().await;
    }

    // ------------------------------------------------------------------
    // Handling
    // ------------------------------------------------------------------

    async fn handle_datagram(&self, datagram: &[u8], from: SocketAddr) {
        match Packet::decode(datagram) {
            Ok(packet) => self.handle_packet(&packet, from).await,
            Err(e) => debug!(%from, "dropping datagram: {e}"),
        }
    }

    /// Handle a decoded discovery packet from `from`.
    ///
    /// Non-discovery packet types are ignored.
    pub async fn handle_packet(&self, packet: &Packet, from: SocketAddr) {
        if !self.accepts_source(from.ip()) {
            debug!(%from, "ignoring discovery packet from local address");
            return;
        }

        match packet.kind {
            PacketType::Discover => match packet.parse::<DiscoveryRequest>() {
                Ok(request) => {
                    if let Err(e) = self.handle_request(&request, from).await {
                        warn!(%from, "failed to answer discovery request: {e}");
                    }
                }
                Err(e) => debug!(%from, "dropping discovery request: {e}"),
            },
            PacketType::DiscoverReply => match packet.parse::<DiscoveryReply>() {
                Ok(reply) => self.handle_reply(reply, from),
                Err(e) => debug!(%from, "dropping discovery reply: {e}"),
            },
            other => debug!(%from, kind = %other, "not a discovery packet"),
        }
    }

    /// Whether `request` should be answered.
    #[must_use]
    pub fn should_reply(&self, request: &DiscoveryRequest) -> bool {
        if self.device.is_discoverable() {
            return true;
        }
        let (Some(from_id), Some(to_id)) = (&request.from_id, &request.to_id) else {
            return false;
        };
        let Some(key) = self.keys.shared_key(from_id) else {
            debug!(from_id, "directed query from unknown peer");
            return false;
        };
        directed::addressed_to(&key, to_id, &self.device.info().id)
    }

    /// Answer a `DISCOVER` if appropriate. Returns whether a reply was sent.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the reply cannot be sent.
    pub async fn handle_request(
        &self,
        request: &DiscoveryRequest,
        from: SocketAddr,
    ) -> Result<bool, DiscoveryError> {
        if !self.should_reply(request) {
            return Ok(false);
        }

        let reply: DiscoveryReply = self.device.info();
        let bytes = packet::encode(PacketType::DiscoverReply, &reply)?;
        self.transport.send_to(&bytes, from).await?;
        debug!(%from, directed = request.is_directed(), "sent discovery reply");
        Ok(true)
    }

    /// Raise "device found" for a reply received from `from`.
    pub fn handle_reply(&self, reply: DiscoveryReply, from: SocketAddr) {
        if reply.id == self.device.info().id {
            return;
        }
        let device = DiscoveredDevice::from_reply(reply, from, now_millis());
        debug!(id = %device.id, ip = %device.ip, "device found");
        self.sink.device_found(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::DeviceInfo;
    use crate::{NoPairedKeys, StaticDevice};
    use rand_core::OsRng;
    use std::collections::HashMap;
    use tether_transport::udp_async::AsyncUdpTransport;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    struct Keys(HashMap<String, AeadKey>);

    impl PeerKeyLookup for Keys {
        fn shared_key(&self, peer_id: &str) -> Option<AeadKey> {
            self.0.get(peer_id).cloned()
        }
    }

    async fn udp() -> Arc<AsyncUdpTransport> {
        Arc::new(
            AsyncUdpTransport::bind("127.0.0.1:0".parse::<SocketAddr>().unwrap())
                .await
                .unwrap(),
        )
    }

    async fn free_port() -> u16 {
        udp().await.local_addr().unwrap().port()
    }

    fn test_config(port: u16) -> DiscoveryConfig {
        DiscoveryConfig {
            multicast_group: Ipv4Addr::LOCALHOST,
            multicast_port: port,
            interface: Some(Ipv4Addr::UNSPECIFIED),
            broadcast_interval: Duration::from_millis(50),
            ignore_local_sources: false,
        }
    }

    struct Fixture {
        engine: Arc<DiscoveryEngine>,
        device: Arc<StaticDevice>,
        transport: Arc<AsyncUdpTransport>,
        found: mpsc::UnboundedReceiver<DiscoveredDevice>,
    }

    async fn fixture(id: &str, port: u16, discoverable: bool, keys: Arc<dyn PeerKeyLookup>) -> Fixture {
        let transport = udp().await;
        let device = Arc::new(StaticDevice::new(DeviceInfo::new(id, id, 8443), discoverable));
        let (tx, found) = mpsc::unbounded_channel();
        let engine = DiscoveryEngine::new(
            test_config(port),
            device.clone(),
            keys,
            Arc::new(tx),
            transport.clone(),
        );
        Fixture {
            engine,
            device,
            transport,
            found,
        }
    }

    /// Feed datagrams arriving on the unicast socket back into the engine.
    fn pump_replies(f: &Fixture) {
        let engine = f.engine.clone();
        let transport = f.transport.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
            while let Ok((n, from)) = transport.recv_from(&mut buf).await {
                if let Ok(packet) = Packet::decode(&buf[..n]) {
                    engine.handle_packet(&packet, from).await;
                }
            }
        });
    }

    #[test]
    fn test_default_config() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.group_addr().to_string(), "239.255.77.88:52352");
        assert_eq!(config.broadcast_interval, Duration::from_secs(5));
        assert!(config.ignore_local_sources);
        assert!(config.validate().is_ok());

        let bad = DiscoveryConfig {
            multicast_port: 0,
            ..DiscoveryConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_broadcast_discovers_discoverable_device() {
        let port = free_port().await;
        let b = fixture("device-b", port, true, Arc::new(NoPairedKeys)).await;
        b.engine.start_listener().await.unwrap();

        let mut a = fixture("device-a", port, true, Arc::new(NoPairedKeys)).await;
        pump_replies(&a);
        a.engine.broadcast_once().await.unwrap();

        let found = timeout(Duration::from_secs(2), a.found.recv())
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(found.id, "device-b");
        assert_eq!(found.port, 8443);
        assert!(found.ip.is_loopback());

        b.engine.stop().await;
    }

    #[tokio::test]
    async fn test_hidden_device_ignores_broadcast() {
        let port = free_port().await;
        let b = fixture("device-b", port, false, Arc::new(NoPairedKeys)).await;
        b.engine.start_listener().await.unwrap();

        let mut a = fixture("device-a", port, true, Arc::new(NoPairedKeys)).await;
        pump_replies(&a);
        a.engine.broadcast_once().await.unwrap();

        assert!(
            timeout(Duration::from_millis(300), a.found.recv())
                .await
                .is_err()
        );
        b.engine.stop().await;
    }

    #[tokio::test]
    async fn test_directed_query_reaches_hidden_partner() {
        let key = AeadKey::generate(&mut OsRng);
        let port = free_port().await;

        let b_keys = Keys(HashMap::from([("device-a".to_owned(), key.clone())]));
        let b = fixture("device-b", port, false, Arc::new(b_keys)).await;
        b.engine.start_listener().await.unwrap();

        let mut a = fixture("device-a", port, false, Arc::new(NoPairedKeys)).await;
        pump_replies(&a);
        a.engine.discover_specific("device-b", &key).await.unwrap();

        let found = timeout(Duration::from_secs(2), a.found.recv())
            .await
            .expect("timeout")
            .unwrap();
        assert_eq!(found.id, "device-b");
        b.engine.stop().await;
    }

    #[tokio::test]
    async fn test_directed_query_for_someone_else_is_ignored() {
        let key = AeadKey::generate(&mut OsRng);
        let keys = Keys(HashMap::from([("device-a".to_owned(), key.clone())]));
        let b = fixture("device-b", free_port().await, false, Arc::new(keys)).await;

        let request = DiscoveryRequest {
            from_id: Some("device-a".into()),
            to_id: Some(directed::seal_target(&key, "device-c").unwrap()),
        };
        assert!(!b.engine.should_reply(&request));

        let wrong_key = AeadKey::generate(&mut OsRng);
        let request = DiscoveryRequest {
            from_id: Some("device-a".into()),
            to_id: Some(directed::seal_target(&wrong_key, "device-b").unwrap()),
        };
        assert!(!b.engine.should_reply(&request));

        b.device.set_discoverable(true);
        assert!(b.engine.should_reply(&request));
    }

    #[tokio::test]
    async fn test_start_twice_is_noop_and_stop_releases_port() {
        let port = free_port().await;
        let b = fixture("device-b", port, true, Arc::new(NoPairedKeys)).await;

        b.engine.start_listener().await.unwrap();
        b.engine.start_listener().await.unwrap();
        b.engine.start_broadcast().await;
        b.engine.start_broadcast().await;
        assert!(b.engine.is_listening().await);
        assert!(b.engine.is_broadcasting().await);

        b.engine.stop().await;
        assert!(!b.engine.is_listening().await);
        assert!(!b.engine.is_broadcasting().await);

        b.engine.start_listener().await.unwrap();
        assert!(b.engine.is_listening().await);
        b.engine.stop_listener().await;
    }

    #[tokio::test]
    async fn test_own_reply_is_ignored() {
        let mut a = fixture("device-a", free_port().await, true, Arc::new(NoPairedKeys)).await;
        let own = DeviceInfo::new("device-a", "me", 1);
        a.engine.handle_reply(own, "127.0.0.1:1".parse().unwrap());
        assert!(a.found.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_local_source_filter() {
        let transport = udp().await;
        let device = Arc::new(StaticDevice::new(DeviceInfo::new("x", "x", 1), true));
        let (tx, _rx) = mpsc::unbounded_channel();
        let engine = DiscoveryEngine::new(
            DiscoveryConfig::default(),
            device,
            Arc::new(NoPairedKeys),
            Arc::new(tx),
            transport,
        );
        assert!(!engine.accepts_source("127.0.0.1".parse().unwrap()));
        assert!(engine.accepts_source("203.0.113.9".parse().unwrap()));
    }
}
