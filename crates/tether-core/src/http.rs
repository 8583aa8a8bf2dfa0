//! Peer HTTP endpoints
//!
//! Serves `POST /peer_graphql` and `GET /fs?id=` for a [`Node`] with warp,
//! over TLS with a self-signed certificate. Peers do not validate the
//! certificate; the envelope carries authentication, and the transport keeps
//! file bytes off the LAN in clear.
//!
//! Both routes need the caller's device id in the `c-id` header. Errors map
//! to statuses with [`TetherError::http_status`].
//!
//! # Example
//!
//! ```no_run
//! # async fn run(node: tether_core::Node) -> tether_core::Result<()> {
//! use tether_core::http::{HttpServer, TlsIdentity, routes};
//!
//! let tls = TlsIdentity::self_signed(vec!["localhost".into()])?;
//! let server = HttpServer::bind(routes(node), "0.0.0.0:8443".parse().unwrap(), Some(&tls))?;
//! println!("listening on {}", server.local_addr());
//! server.shutdown().await;
//! # Ok(())
//! # }
//! ```

use crate::error::{Result, TetherError};
use crate::messaging::envelope::CALLER_ID_HEADER;
use crate::node::Node;
use futures_util::{Stream, StreamExt};
use serde::Deserialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use tokio::task::JoinHandle;
use tokio_util::io::ReaderStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use warp::http::StatusCode;
use warp::http::header::{CONTENT_LENGTH, CONTENT_TYPE, HeaderValue};
use warp::hyper::Body;
use warp::hyper::body::{Buf, Bytes};
use warp::reply::Response;
use warp::{Filter, Rejection, Reply};

/// Largest accepted RPC body.
pub const MAX_RPC_BODY: usize = 16 * 1024 * 1024;

/// Rejection carrying the status to answer with.
#[derive(Debug)]
pub struct Refused(pub u16);

impl warp::reject::Reject for Refused {}

/// Log `error` for `caller` and turn it into a rejection.
#[must_use]
pub fn refuse(caller: &str, error: &TetherError) -> Rejection {
    warn!(caller, "rejected peer request: {error}");
    warp::reject::custom(Refused(error.http_status()))
}

/// Extract the caller id; a missing or empty header is refused with 403.
pub fn caller() -> impl Filter<Extract = (String,), Error = Rejection> + Clone {
    warp::header::optional::<String>(CALLER_ID_HEADER).and_then(|caller: Option<String>| async move {
        caller
            .filter(|c| !c.is_empty())
            .ok_or_else(|| warp::reject::custom(Refused(403)))
    })
}

fn with_node(node: Node) -> impl Filter<Extract = (Node,), Error = Infallible> + Clone {
    warp::any().map(move || node.clone())
}

/// Collect a request body of any transfer encoding, up to `limit` bytes.
async fn read_body<S, B>(body: S, limit: usize) -> std::result::Result<Vec<u8>, Rejection>
where
    S: Stream<Item = std::result::Result<B, warp::Error>>,
    B: Buf,
{
    futures_util::pin_mut!(body);
    let mut out = Vec::new();
    while let Some(chunk) = body.next().await {
        let mut chunk = chunk.map_err(|e| {
            debug!("reading request body: {e}");
            warp::reject::custom(Refused(400))
        })?;
        if out.len() + chunk.remaining() > limit {
            return Err(warp::reject::custom(Refused(413)));
        }
        out.extend_from_slice(&chunk.copy_to_bytes(chunk.remaining()));
    }
    Ok(out)
}

/// `POST /peer_graphql`: an encrypted, signed request in, an encrypted reply out.
pub fn rpc_route(node: Node) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("peer_graphql")
        .and(warp::post())
        .and(caller())
        .and(warp::body::stream())
        .and(with_node(node))
        .and_then(answer_rpc)
}

async fn answer_rpc<S, B>(
    caller: String,
    body: S,
    node: Node,
) -> std::result::Result<Vec<u8>, Rejection>
where
    S: Stream<Item = std::result::Result<B, warp::Error>>,
    B: Buf,
{
    let body = read_body(body, MAX_RPC_BODY).await?;
    node.handle_rpc(&caller, &body)
        .await
        .map_err(|e| refuse(&caller, &e))
}

/// Query of the file route.
#[derive(Debug, Deserialize)]
pub struct FileQuery {
    /// Registered file id
    pub id: String,
}

/// `GET /fs?id=`: stream a registered file to a paired caller.
pub fn file_route(node: Node) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("fs")
        .and(warp::get())
        .and(caller())
        .and(warp::query::<FileQuery>())
        .and(with_node(node))
        .and_then(|caller: String, query: FileQuery, node: Node| async move {
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
            info!(%caller, path = %path.display(), len, "serving file");
            Ok::<_, Rejection>(stream_response(ReaderStream::new(file), len))
        })
}

/// An `application/octet-stream` response of `len` bytes read from `stream`.
pub fn stream_response<S, E>(stream: S, len: u64) -> Response
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Box<dyn std::error::Error + Send + Sync>> + 'static,
{
    let mut response = Response::new(Body::wrap_stream(stream));
    let headers = response.headers_mut();
    headers.insert(CONTENT_LENGTH, HeaderValue::from(len));
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
    response
}

/// Answer rejections with a bare status.
///
/// # Errors
///
/// Never fails.
pub async fn recover(rejection: Rejection) -> std::result::Result<impl Reply, Infallible> {
    let status = if let Some(Refused(code)) = rejection.find::<Refused>() {
        StatusCode::from_u16(*code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    } else if rejection.is_not_found() {
        StatusCode::NOT_FOUND
    } else if rejection.find::<warp::reject::MethodNotAllowed>().is_some() {
        StatusCode::METHOD_NOT_ALLOWED
    } else {
        StatusCode::BAD_REQUEST
    };
    Ok(warp::reply::with_status(warp::reply(), status))
}

/// Both peer routes with rejections answered.
pub fn routes(node: Node) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    rpc_route(node.clone()).or(file_route(node)).recover(recover)
}

/// PEM certificate and private key for the peer endpoint.
#[derive(Clone)]
pub struct TlsIdentity {
    /// Certificate chain (PEM)
    pub cert_pem: String,
    /// PKCS#8 private key (PEM)
    pub key_pem: String,
}

impl TlsIdentity {
    /// Generate a self-signed certificate for `names`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if a name is not a valid DNS name or IP.
    pub fn self_signed(names: Vec<String>) -> Result<Self> {
        let rcgen::CertifiedKey { cert, key_pair } = rcgen::generate_simple_self_signed(names)
            .map_err(|e| TetherError::InvalidConfig(format!("self-signed certificate: {e}").into()))?;
        Ok(Self {
            cert_pem: cert.pem(),
            key_pem: key_pair.serialize_pem(),
        })
    }
}

impl std::fmt::Debug for TlsIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TlsIdentity").finish_non_exhaustive()
    }
}

/// A running peer endpoint.
#[derive(Debug)]
pub struct HttpServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl HttpServer {
    /// Bind `addr` and serve `routes` on a background task, over TLS when
    /// `tls` is given.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the address cannot be bound.
    pub fn bind<F, R>(routes: F, addr: SocketAddr, tls: Option<&TlsIdentity>) -> Result<Self>
    where
        F: Filter<Extract = (R,), Error = Infallible> + Clone + Send + Sync + 'static,
        R: Reply,
    {
        let shutdown = CancellationToken::new();
        let signal = {
            let token = shutdown.clone();
            async move { token.cancelled().await }
        };
        let bind_error = |e: &dyn std::fmt::Display| TetherError::Network(format!("binding {addr}: {e}").into());

        let server = warp::serve(routes);
        let (local_addr, task) = match tls {
            Some(tls) => {
                // the TLS server panics when binding fails; try the address first
                drop(std::net::TcpListener::bind(addr).map_err(|e| bind_error(&e))?);
                let (local_addr, serving) = server
                    .tls()
                    .cert(tls.cert_pem.as_bytes())
                    .key(tls.key_pem.as_bytes())
                    .bind_with_graceful_shutdown(addr, signal);
                (local_addr, tokio::spawn(serving))
            }
            None => {
                let (local_addr, serving) = server
                    .try_bind_with_graceful_shutdown(addr, signal)
                    .map_err(|e| bind_error(&e))?;
                (local_addr, tokio::spawn(serving))
            }
        };
        info!(%local_addr, tls = tls.is_some(), "peer HTTP endpoint listening");

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    /// Bound address.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting, let in-flight requests finish, and wait for the task.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        if let Err(e) = self.task.await {
            if e.is_panic() {
                warn!("peer HTTP endpoint panicked: {e}");
            }
        }
        debug!(addr = %self.local_addr, "peer HTTP endpoint stopped");
    }
}
