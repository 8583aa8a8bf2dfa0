//! Test nodes with an in-process HTTPS endpoint
//!
//! Each [`TestNode`] runs a real [`Node`] on loopback plus the warp peer
//! endpoint over a self-signed certificate, so two test nodes can pair over
//! UDP and then message and download from each other over HTTPS.
//!
//! # Example
//!
//! ```no_run
//! use tether_integration_tests::fixtures::paired_nodes;
//!
//! #[tokio::test]
//! async fn test_something() {
//!     let (a, b) = paired_nodes().await;
//!     // ... exercise a.node / b.node ...
//!     a.shutdown().await;
//!     b.shutdown().await;
//! }
//! ```

use futures_util::StreamExt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tether_core::config::DiscoveryConfig;
use tether_core::files::DirFileStore;
use tether_core::http::{
    FileQuery, HttpServer, TlsIdentity, caller, recover, refuse, routes, rpc_route,
    stream_response,
};
use tether_core::messaging::MemoryMessageStore;
use tether_core::pairing::{AutoAccept, AutoReject, PairingPolicy, PairingTarget};
use tether_core::store::MemoryPeerStore;
use tether_core::{DeviceContext, DeviceIdentity, Event, Node, NodeConfig, NodeServices};
use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};
use tokio_util::io::ReaderStream;
use warp::{Filter, Rejection, Reply};

const CHUNK: usize = 64 * 1024;

/// How long fixtures wait for an expected event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(15);

/// Options for [`TestNode::start_with`].
#[derive(Clone)]
pub struct NodeOptions {
    /// Pairing decision
    pub policy: Arc<dyn PairingPolicy>,
    /// Delay between 64 KiB chunks when serving files
    pub serve_delay: Duration,
}

impl Default for NodeOptions {
    fn default() -> Self {
        Self {
            policy: Arc::new(AutoReject),
            serve_delay: Duration::ZERO,
        }
    }
}

/// A node on loopback with its stores and event stream exposed.
pub struct TestNode {
    pub node: Node,
    pub store: Arc<MemoryPeerStore>,
    pub files: Arc<DirFileStore>,
    pub messages: Arc<MemoryMessageStore>,
    pub events: UnboundedReceiver<Event>,
    pub http_addr: SocketAddr,
    pub dir: TempDir,
    http: HttpServer,
}

impl TestNode {
    /// Start a node that declines pairing requests.
    pub async fn start(name: &str) -> Self {
        Self::start_with(name, NodeOptions::default()).await
    }

    /// Start a node with `options`.
    pub async fn start_with(name: &str, options: NodeOptions) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        // the context advertises the port, so pick it before the node exists
        let http_addr = std::net::TcpListener::bind("127.0.0.1:0")
            .and_then(|l| l.local_addr())
            .expect("free port");

        let ctx = DeviceContext::new(DeviceIdentity::generate(), name, http_addr.port())
            .with_device_type("test");
        let store = Arc::new(MemoryPeerStore::new());
        let files = Arc::new(DirFileStore::new(dir.path().join("downloads")));
        let messages = Arc::new(MemoryMessageStore::new());
        let (tx, events) = unbounded_channel();

        let mut config = NodeConfig {
            unicast_addr: "127.0.0.1:0".parse().expect("addr"),
            discovery: DiscoveryConfig {
                ignore_local_sources: false,
                ..DiscoveryConfig::default()
            },
            ..NodeConfig::default()
        };
        config.transfer.progress_interval = Duration::from_millis(20);

        let services = NodeServices {
            store: store.clone(),
            files: files.clone(),
            messages: messages.clone(),
            events: Arc::new(tx),
            policy: options.policy,
        };
        let node = Node::start(Arc::new(ctx), config, services)
            .await
            .expect("node start");
        let tls = TlsIdentity::self_signed(vec!["localhost".into()]).expect("certificate");
        let http = if options.serve_delay.is_zero() {
            HttpServer::bind(routes(node.clone()), http_addr, Some(&tls))
        } else {
            let throttled = rpc_route(node.clone())
                .or(throttled_files(node.clone(), options.serve_delay))
                .recover(recover);
            HttpServer::bind(throttled, http_addr, Some(&tls))
        }
        .expect("bind http");

        Self {
            node,
            store,
            files,
            messages,
            events,
            http_addr,
            dir,
            http,
        }
    }

    /// Device id.
    pub fn id(&self) -> String {
        self.node.context().id().to_owned()
    }

    /// Where to send pairing requests for this node.
    pub fn target(&self) -> PairingTarget {
        PairingTarget {
            id: self.id(),
            name: self.node.context().name().to_owned(),
            address: self.node.local_addr().expect("local addr"),
        }
    }

    /// Wait for the first event matching `want`, skipping others.
    pub async fn wait_for(&mut self, want: impl Fn(&Event) -> bool) -> Event {
        tokio::time::timeout(EVENT_TIMEOUT, async {
            loop {
                let event = self.events.recv().await.expect("event stream closed");
                if want(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for event")
    }

    /// Whether an event matching `want` arrives within `window`.
    pub async fn sees_within(&mut self, window: Duration, want: impl Fn(&Event) -> bool) -> bool {
        tokio::time::timeout(window, async {
            while let Some(event) = self.events.recv().await {
                if want(&event) {
                    return true;
                }
            }
            false
        })
        .await
        .unwrap_or(false)
    }

    /// Stop the node and its HTTP endpoint.
    pub async fn shutdown(self) {
        self.http.shutdown().await;
        self.node.shutdown().await;
    }
}

/// Two nodes paired with each other. `b` accepted `a`'s request.
pub async fn paired_nodes() -> (TestNode, TestNode) {
    paired_nodes_with(NodeOptions::default(), NodeOptions::default()).await
}

/// Like [`paired_nodes`] with custom options; `b`'s policy is always
/// auto-accept.
pub async fn paired_nodes_with(a: NodeOptions, b: NodeOptions) -> (TestNode, TestNode) {
    let mut a = TestNode::start_with("alpha", a).await;
    let mut b = TestNode::start_with(
        "beta",
        NodeOptions {
            policy: Arc::new(AutoAccept),
            ..b
        },
    )
    .await;

    a.node.pairing().initiate(b.target()).await.expect("initiate");
    a.wait_for(|e| matches!(e, Event::PairingSucceeded { .. })).await;
    b.wait_for(|e| matches!(e, Event::PairingSucceeded { .. })).await;
    (a, b)
}

/// `GET /fs` that sleeps `delay` before each 64 KiB chunk.
fn throttled_files(
    node: Node,
    delay: Duration,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("fs")
        .and(warp::get())
        .and(caller())
        .and(warp::query::<FileQuery>())
        .and_then(move |caller: String, query: FileQuery| {
            let node = node.clone();
            async move {
                let path = node
                    .resolve_file(&caller, &query.id)
                    .map_err(|e| refuse(&caller, &e))?;
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| refuse(&caller, &e.into()))?;
                let len = file
                    .metadata()
                    .await
                    .map_err(|e| refuse(&caller, &e.into()))?
                    .len();
                let body = ReaderStream::with_capacity(file, CHUNK).then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    chunk
                });
                Ok::<_, Rejection>(stream_response(body, len))
            }
        })
}
