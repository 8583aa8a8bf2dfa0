//! Node - wires the engines around one device
//!
//! The node owns the unicast UDP socket. Every datagram the device sends
//! leaves from it, so every reply (discovery replies, pairing responses)
//! arrives on it; the listener loop hands them to the right engine.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tether_core::events::LogSink;
//! use tether_core::files::DirFileStore;
//! use tether_core::messaging::MemoryMessageStore;
//! use tether_core::pairing::AutoReject;
//! use tether_core::store::MemoryPeerStore;
//! use tether_core::{DeviceContext, DeviceIdentity, Node, NodeConfig, NodeServices};
//!
//! #[tokio::main]
//! async fn main() -> tether_core::Result<()> {
//!     let ctx = Arc::new(DeviceContext::new(DeviceIdentity::generate(), "laptop", 8443));
//!     let services = NodeServices {
//!         store: Arc::new(MemoryPeerStore::new()),
//!         files: Arc::new(DirFileStore::new("downloads")),
//!         messages: Arc::new(MemoryMessageStore::new()),
//!         events: Arc::new(LogSink),
//!         policy: Arc::new(AutoReject),
//!     };
//!     let node = Node::start(ctx, NodeConfig::default(), services).await?;
//!     node.discovery().start_listener().await?;
//!     node.discovery().broadcast_once().await?;
//!     node.shutdown().await;
//!     Ok(())
//! }
//! ```

use crate::config::NodeConfig;
use crate::context::DeviceContext;
use crate::error::Result;
use crate::events::{Event, EventSink};
use crate::files::LocalFileStore;
use crate::messaging::{ChatReceiver, ChatSender, MessageStore, PeerRpcClient, PeerRpcResponder};
use crate::pairing::{PairingEngine, PairingPolicy};
use crate::store::{PairingState, PeerStore, StoreKeyLookup};
use crate::transfer::{TransferManager, resolve_file_request};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tether_discovery::{DiscoveredDevice, DiscoveryEngine, DiscoverySink};
use tether_transport::udp_async::AsyncUdpTransport;
use tether_transport::{MAX_DATAGRAM_SIZE, Packet, Transport, TransportError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Storage and host hooks a node runs on.
pub struct NodeServices {
    /// Known devices
    pub store: Arc<dyn PeerStore>,
    /// Shared and downloaded files
    pub files: Arc<dyn LocalFileStore>,
    /// Chat history
    pub messages: Arc<dyn MessageStore>,
    /// Where events go
    pub events: Arc<dyn EventSink>,
    /// Decides incoming pairing requests
    pub policy: Arc<dyn PairingPolicy>,
}

/// Reports discovered devices to the host.
///
/// Discovery replies are unauthenticated, so they never touch the peer
/// store; stored addresses change only through pairing.
struct DeviceReporter {
    events: Arc<dyn EventSink>,
}

impl DiscoverySink for DeviceReporter {
    fn device_found(&self, device: DiscoveredDevice) {
        self.events.emit(Event::DeviceFound(device));
    }
}

struct NodeInner {
    ctx: Arc<DeviceContext>,
    store: Arc<dyn PeerStore>,
    files: Arc<dyn LocalFileStore>,
    transport: Arc<AsyncUdpTransport>,
    discovery: Arc<DiscoveryEngine>,
    pairing: Arc<PairingEngine>,
    chat: ChatSender,
    responder: PeerRpcResponder,
    transfers: TransferManager,
    shutdown: CancellationToken,
    listener: Mutex<Option<JoinHandle<()>>>,
}

/// A running device.
///
/// Cheap to clone; clones share the same socket and engines.
#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// Bind the unicast socket, build the engines and start the listener.
    ///
    /// Discovery loops are not started; use [`Node::discovery`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or the socket cannot
    /// be bound.
    pub async fn start(
        ctx: Arc<DeviceContext>,
        config: NodeConfig,
        services: NodeServices,
    ) -> Result<Self> {
        config.validate()?;
        let NodeServices {
            store,
            files,
            messages,
            events,
            policy,
        } = services;

        let transport = Arc::new(AsyncUdpTransport::bind(config.unicast_addr).await?);
        let local = transport.local_addr()?;

        let discovery = DiscoveryEngine::new(
            config.discovery.clone(),
            ctx.clone(),
            Arc::new(StoreKeyLookup(Arc::clone(&store))),
            Arc::new(DeviceReporter {
                events: Arc::clone(&events),
            }),
            transport.clone(),
        );
        let pairing = Arc::new(PairingEngine::new(
            Arc::clone(&ctx),
            config.pairing.clone(),
            Arc::clone(&store),
            Arc::clone(&events),
            policy,
            transport.clone(),
        ));

        let client = PeerRpcClient::new(Arc::clone(&ctx), config.rpc.clone())?;
        let chat = ChatSender::new(
            client,
            Arc::clone(&store),
            Arc::clone(&files),
            Arc::clone(&messages),
        );
        let transfers = TransferManager::new(
            config.transfer.clone(),
            config.rpc.clone(),
            ctx.id(),
            Arc::clone(&store),
            Arc::clone(&files),
            Arc::clone(&messages),
            Arc::clone(&events),
        )?;
        let receiver = ChatReceiver::new(messages, Arc::new(transfers.clone()), events);
        let responder = PeerRpcResponder::new(
            Arc::clone(&store),
            Arc::new(receiver),
            config.pairing.timestamp_tolerance,
        );

        let inner = Arc::new(NodeInner {
            ctx,
            store,
            files,
            transport,
            discovery,
            pairing,
            chat,
            responder,
            transfers,
            shutdown: CancellationToken::new(),
            listener: Mutex::new(None),
        });

        let handle = tokio::spawn(listen(Arc::clone(&inner)));
        *inner.listener.lock().await = Some(handle);
        info!(id = %inner.ctx.id(), %local, "node started");

        Ok(Self { inner })
    }

    /// The device this node runs as.
    #[must_use]
    pub fn context(&self) -> &Arc<DeviceContext> {
        &self.inner.ctx
    }

    /// Address of the unicast socket.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the socket is closed.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.inner.transport.local_addr()?)
    }

    /// Peer store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn PeerStore> {
        &self.inner.store
    }

    /// Discovery engine.
    #[must_use]
    pub fn discovery(&self) -> &Arc<DiscoveryEngine> {
        &self.inner.discovery
    }

    /// Pairing engine.
    #[must_use]
    pub fn pairing(&self) -> &Arc<PairingEngine> {
        &self.inner.pairing
    }

    /// Outgoing chat.
    #[must_use]
    pub fn chat(&self) -> &ChatSender {
        &self.inner.chat
    }

    /// Transfer manager.
    #[must_use]
    pub fn transfers(&self) -> &TransferManager {
        &self.inner.transfers
    }

    /// Send a directed discovery query to every paired peer.
    ///
    /// # Errors
    ///
    /// Returns the first send failure.
    pub async fn discover_paired(&self) -> Result<usize> {
        let mut sent = 0;
        for peer in self.inner.store.all_paired() {
            if let PairingState::Paired { symmetric_key, .. } = &peer.pairing {
                self.inner
                    .discovery
                    .discover_specific(&peer.id, symmetric_key)
                    .await?;
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Forget a peer. Returns whether it was known.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot persist the change.
    pub fn unpair(&self, peer_id: &str) -> Result<bool> {
        let removed = self.inner.store.delete(peer_id)?;
        if removed {
            info!(peer_id, "peer removed");
        }
        Ok(removed)
    }

    /// Answer an inbound RPC body from `caller_id`. The host's HTTP layer
    /// calls this for the RPC path and maps errors with
    /// [`crate::TetherError::http_status`].
    ///
    /// # Errors
    ///
    /// See [`PeerRpcResponder::handle`].
    pub async fn handle_rpc(&self, caller_id: &str, body: &[u8]) -> Result<Vec<u8>> {
        self.inner.responder.handle(caller_id, body).await
    }

    /// Resolve an inbound file request from `caller_id` to a local path.
    ///
    /// # Errors
    ///
    /// See [`resolve_file_request`].
    pub fn resolve_file(&self, caller_id: &str, file_id: &str) -> Result<PathBuf> {
        resolve_file_request(
            self.inner.store.as_ref(),
            self.inner.files.as_ref(),
            caller_id,
            file_id,
        )
    }

    /// Whether the listener loop is running.
    pub async fn is_running(&self) -> bool {
        self.inner
            .listener
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    /// Stop discovery, the listener and all transfers, then close the socket.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.discovery.stop().await;
        let handle = self.inner.listener.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    warn!("node listener panicked: {e}");
                }
            }
        }
        self.inner.transfers.shutdown().await;
        self.inner.transport.close();
        info!(id = %self.inner.ctx.id(), "node stopped");
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.inner.ctx.id())
            .field("local_addr", &self.inner.transport.local_addr().ok())
            .finish_non_exhaustive()
    }
}

async fn listen(inner: Arc<NodeInner>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let received = tokio::select! {
            () = inner.shutdown.cancelled() => break,
            received = inner.transport.recv_from(&mut buf) => received,
        };
        match received {
            Ok((len, from)) => dispatch(&inner, &buf[..len], from).await,
            Err(TransportError::Closed) => break,
            Err(e) => {
                warn!("unicast receive failed: {e}");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
    debug!("unicast listener stopped");
}

async fn dispatch(inner: &NodeInner, datagram: &[u8], from: SocketAddr) {
    let packet = match Packet::decode(datagram) {
        Ok(packet) => packet,
        Err(e) => {
            debug!(%from, "dropping datagram: {e}");
            return;
        }
    };

    if packet.kind.is_pairing() {
        // the responder side waits on the policy; keep the socket draining
        let pairing = Arc::clone(&inner.pairing);
        tokio::spawn(async move { pairing.handle_packet(&packet, from).await });
    } else {
        inner.discovery.handle_packet(&packet, from).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DiscoveryConfig;
    use crate::files::DirFileStore;
    use crate::identity::DeviceIdentity;
    use crate::messaging::MemoryMessageStore;
    use crate::pairing::{AutoAccept, AutoReject, PairingTarget};
    use crate::store::MemoryPeerStore;
    use crate::store::tests::{paired_record, unpaired_record};
    use tether_discovery::messages::DiscoveryReply;
    use tether_transport::PacketType;
    use tokio::sync::mpsc;

    struct TestNode {
        node: Node,
        store: Arc<MemoryPeerStore>,
        events: mpsc::UnboundedReceiver<Event>,
        _dir: tempfile::TempDir,
    }

    async fn start(name: &str, policy: Arc<dyn PairingPolicy>) -> TestNode {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryPeerStore::new());
        let (tx, events) = mpsc::unbounded_channel();
        let ctx = Arc::new(DeviceContext::new(DeviceIdentity::generate(), name, 8443));
        let config = NodeConfig {
            unicast_addr: "127.0.0.1:0".parse().unwrap(),
            discovery: DiscoveryConfig {
                ignore_local_sources: false,
                ..DiscoveryConfig::default()
            },
            ..NodeConfig::default()
        };
        let services = NodeServices {
            store: store.clone(),
            files: Arc::new(DirFileStore::new(dir.path().join("downloads"))),
            messages: Arc::new(MemoryMessageStore::new()),
            events: Arc::new(tx),
            policy,
        };
        let node = Node::start(ctx, config, services).await.unwrap();
        TestNode {
            node,
            store,
            events,
            _dir: dir,
        }
    }

    fn target(of: &TestNode) -> PairingTarget {
        PairingTarget {
            id: of.node.context().id().to_owned(),
            name: of.node.context().name().to_owned(),
            address: of.node.local_addr().unwrap(),
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>, want: impl Fn(&Event) -> bool) -> Event {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let event = rx.recv().await.expect("event channel closed");
                if want(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    #[tokio::test]
    async fn test_nodes_pair_over_udp() {
        let mut a = start("alpha", Arc::new(AutoReject)).await;
        let mut b = start("beta", Arc::new(AutoAccept)).await;

        a.node.pairing().initiate(target(&b)).await.unwrap();

        next_event(&mut a.events, |e| matches!(e, Event::PairingSucceeded { .. })).await;
        next_event(&mut b.events, |e| matches!(e, Event::PairingSucceeded { .. })).await;

        let a_id = a.node.context().id().to_owned();
        let b_id = b.node.context().id().to_owned();
        let on_a = a.store.get(&b_id).unwrap();
        let on_b = b.store.get(&a_id).unwrap();
        let (k_a, _) = on_a.paired_keys().unwrap();
        let (k_b, _) = on_b.paired_keys().unwrap();
        assert!(k_a.ct_eq(k_b));
        assert!(!a.node.pairing().has_session(&b_id));

        a.node.shutdown().await;
        b.node.shutdown().await;
    }

    #[tokio::test]
    async fn test_declined_pairing_stores_nothing() {
        let mut a = start("alpha", Arc::new(AutoAccept)).await;
        let b = start("beta", Arc::new(AutoReject)).await;

        a.node.pairing().initiate(target(&b)).await.unwrap();
        let failed = next_event(&mut a.events, |e| matches!(e, Event::PairingFailed { .. })).await;
        assert!(matches!(failed, Event::PairingFailed { reason, .. } if reason.contains("declined")));
        assert!(a.store.all_paired().is_empty());
        assert!(b.store.all_paired().is_empty());

        a.node.shutdown().await;
        b.node.shutdown().await;
    }

    #[tokio::test]
    async fn test_garbage_datagrams_are_ignored() {
        let mut a = start("alpha", Arc::new(AutoReject)).await;
        let mut b = start("beta", Arc::new(AutoAccept)).await;

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = b.node.local_addr().unwrap();
        sender.send_to(b"not a packet", addr).await.unwrap();
        sender.send_to(b"PAIR_REQUEST:{", addr).await.unwrap();

        a.node.pairing().initiate(target(&b)).await.unwrap();
        next_event(&mut b.events, |e| matches!(e, Event::PairingSucceeded { .. })).await;
        next_event(&mut a.events, |e| matches!(e, Event::PairingSucceeded { .. })).await;
        assert!(b.node.is_running().await);

        a.node.shutdown().await;
        b.node.shutdown().await;
    }

    #[tokio::test]
    async fn test_discovery_reply_does_not_move_paired_peer() {
        let mut a = start("alpha", Arc::new(AutoReject)).await;
        a.store.insert(paired_record("dev-b")).unwrap();
        let before = a.store.get("dev-b").unwrap();

        let reply = DiscoveryReply {
            id: "dev-b".into(),
            name: "evil".into(),
            device_type: "phone".into(),
            version: "1.0".into(),
            platform: "android".into(),
            port: 9999,
        };
        let spoofer = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let datagram = tether_transport::packet::encode(PacketType::DiscoverReply, &reply).unwrap();
        spoofer
            .send_to(&datagram, a.node.local_addr().unwrap())
            .await
            .unwrap();

        let Event::DeviceFound(device) =
            next_event(&mut a.events, |e| matches!(e, Event::DeviceFound(_))).await
        else {
            unreachable!()
        };
        assert_eq!(device.id, "dev-b");
        assert_eq!(device.port, 9999);

        let after = a.store.get("dev-b").unwrap();
        assert_eq!(after.ip, before.ip);
        assert_eq!(after.port, 8443);
        assert_eq!(after.name, "dev-b-name");
        assert_eq!(after.updated_at, before.updated_at);
        assert!(after.is_paired());

        a.node.shutdown().await;
    }

    #[tokio::test]
    async fn test_unpair_and_shutdown() {
        let a = start("alpha", Arc::new(AutoReject)).await;
        a.store.insert(unpaired_record("dev-b")).unwrap();

        assert!(a.node.unpair("dev-b").unwrap());
        assert!(!a.node.unpair("dev-b").unwrap());
        assert_eq!(a.node.discover_paired().await.unwrap(), 0);
        assert!(a.node.is_running().await);

        a.node.shutdown().await;
        assert!(!a.node.is_running().await);
    }

    #[tokio::test]
    async fn test_file_requests_need_a_paired_caller() {
        let a = start("alpha", Arc::new(AutoReject)).await;
        let err = a.node.resolve_file("nobody", "f1").unwrap_err();
        assert_eq!(err.http_status(), 403);
        a.node.shutdown().await;
    }
}
