//! Inbound peer RPC.
//!
//! The host application's HTTP server passes the `c-id` header and the raw
//! body of each `/peer_graphql` POST to [`PeerRpcResponder::handle`] and
//! writes back the returned bytes. Errors carry an HTTP status through
//! [`TetherError::http_status`](crate::TetherError::http_status).

use super::envelope::{RpcRequest, RpcResponse, open_envelope};
use crate::error::{Result, TetherError};
use crate::store::{PeerRecord, PeerStore};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tether_crypto::verify::now_millis;
use tracing::{debug, warn};

/// Executes authenticated requests.
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Handle `request` from the verified `caller`. An error becomes an entry
    /// in the response's `errors`.
    async fn handle(&self, caller: &PeerRecord, request: RpcRequest) -> Result<Value>;
}

/// Authenticates, dispatches and encrypts peer RPC.
pub struct PeerRpcResponder {
    store: Arc<dyn PeerStore>,
    handler: Arc<dyn RpcHandler>,
    tolerance: Duration,
}

impl PeerRpcResponder {
    /// Create a responder accepting envelopes within `tolerance` of local time.
    #[must_use]
    pub fn new(store: Arc<dyn PeerStore>, handler: Arc<dyn RpcHandler>, tolerance: Duration) -> Self {
        Self {
            store,
            handler,
            tolerance,
        }
    }

    /// Process one request body from `caller_id`.
    ///
    /// # Errors
    ///
    /// `PeerNotFound`/`NotPaired` for unknown callers, `Crypto` if the body does
    /// not decrypt, `Authentication` for malformed, stale or forged envelopes
    /// and `Serialization` for an unparseable request.
    pub async fn handle(&self, caller_id: &str, body: &[u8]) -> Result<Vec<u8>> {
        let caller = self
            .store
            .get(caller_id)
            .ok_or_else(|| TetherError::PeerNotFound(caller_id.to_owned()))?;
        let (key, signer) = caller.paired_keys()?;

        let envelope = open_envelope(key, body)?;
        let verification = envelope.verify(signer, now_millis(), self.tolerance);
        if !verification.is_valid() {
            warn!(caller_id, reason = verification.reason(), "rejecting peer rpc");
            return Err(TetherError::Authentication(verification.reason().into()));
        }

        let request: RpcRequest = serde_json::from_slice(&envelope.payload)?;
        let reply = match self.handler.handle(&caller, request).await {
            Ok(data) => RpcResponse::ok(data),
            Err(e) => {
                debug!(caller_id, "peer rpc handler failed: {e}");
                RpcResponse::error(e.to_string())
            }
        };

        Ok(key.seal(&serde_json::to_vec(&reply)?)?)
    }
}

impl std::fmt::Debug for PeerRpcResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerRpcResponder")
            .field("tolerance", &self.tolerance)
            .finish_non_exhaustive()
    }
}
