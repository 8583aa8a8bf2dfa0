//! Outbound peer RPC.

use super::envelope::{
    CALLER_ID_HEADER, RPC_PATH, RpcRequest, RpcResponse, peer_endpoint, seal_envelope,
};
use crate::config::RpcConfig;
use crate::context::DeviceContext;
use crate::error::{Result, TetherError};
use crate::store::PeerRecord;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tether_crypto::verify::now_millis;
use tether_transport::lan;
use tracing::debug;

/// Build the HTTP client used for peer endpoints.
///
/// Peers serve self-signed certificates, so certificate validation is off;
/// [`ensure_lan`] keeps requests on the local network.
///
/// # Errors
///
/// Returns `Network` if the client cannot be built.
pub fn peer_http_client(connect_timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .connect_timeout(connect_timeout)
        .build()
        .map_err(|e| TetherError::Network(format!("http client: {e}").into()))
}

/// Refuse peers whose address is not LAN-scoped when `lan_only` is set.
///
/// # Errors
///
/// Returns `NotLanAddress` for a non-LAN peer.
pub fn ensure_lan(config: &RpcConfig, peer: &PeerRecord) -> Result<()> {
    if config.lan_only && !lan::is_lan_scoped(peer.ip) {
        return Err(TetherError::NotLanAddress(peer.ip));
    }
    Ok(())
}

/// Sends encrypted, signed requests to paired peers.
#[derive(Clone)]
pub struct PeerRpcClient {
    ctx: Arc<DeviceContext>,
    http: reqwest::Client,
    config: RpcConfig,
}

impl PeerRpcClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns `Network` if the HTTP client cannot be built.
    pub fn new(ctx: Arc<DeviceContext>, config: RpcConfig) -> Result<Self> {
        let http = peer_http_client(config.request_timeout)?;
        Ok(Self::with_http(ctx, config, http))
    }

    /// Create a client around an existing HTTP client.
    #[must_use]
    pub fn with_http(ctx: Arc<DeviceContext>, config: RpcConfig, http: reqwest::Client) -> Self {
        Self { ctx, http, config }
    }

    /// Call `peer` and return the response `data`.
    ///
    /// Nothing is retried.
    ///
    /// # Errors
    ///
    /// Fails if the peer is not paired or not on the LAN, on network errors and
    /// non-2xx statuses, if the response does not decrypt or parse, and if the
    /// response carries any `errors`.
    pub async fn call(&self, peer: &PeerRecord, request: &RpcRequest) -> Result<Value> {
        let (key, _) = peer.paired_keys()?;
        ensure_lan(&self.config, peer)?;

        let payload = serde_json::to_vec(request)?;
        let body = seal_envelope(key, self.ctx.signing_key(), &payload, now_millis())?;
        let url = peer_endpoint(&self.config.scheme, peer.ip, peer.port, RPC_PATH)?;

        let response = self
            .http
            .post(url)
            .timeout(self.config.request_timeout)
            .header(CALLER_ID_HEADER, self.ctx.id())
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TetherError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let sealed = response.bytes().await?;
        let plain = key.open(&sealed)?;
        let reply: RpcResponse = serde_json::from_slice(&plain)?;
        debug!(peer_id = %peer.id, "peer rpc call completed");
        reply.into_result()
    }
}

impl std::fmt::Debug for PeerRpcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRpcClient")
            .field("device_id", &self.ctx.id())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
