//! The encrypted, signed RPC envelope.
//!
//! ```text
//! plaintext = timestamp "|" base64(Ed25519(timestamp ++ payload)) "|" payload
//! wire      = nonce(12) || ChaCha20-Poly1305(K, plaintext)
//! ```
//!
//! The payload is the JSON request and may itself contain `|`; only the first
//! two separators are structural.

use crate::error::{Result, TetherError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tether_crypto::aead::AeadKey;
use tether_crypto::signatures::{SigningKey, VerifyingKey};
use tether_crypto::verify::{FIELD_SEPARATOR, Verification, verify_signed};
use url::Url;

/// Path of the peer RPC endpoint.
pub const RPC_PATH: &str = "/peer_graphql";

/// Path of the peer file endpoint.
pub const FILE_PATH: &str = "/fs";

/// Header carrying the caller's device id.
pub const CALLER_ID_HEADER: &str = "c-id";

/// A GraphQL-style request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Operation text
    pub query: String,
    /// Operation variables
    #[serde(default)]
    pub variables: Value,
}

impl RpcRequest {
    /// Request with `variables`.
    #[must_use]
    pub fn new(query: impl Into<String>, variables: Value) -> Self {
        Self {
            query: query.into(),
            variables,
        }
    }
}

/// One entry of [`RpcResponse::errors`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorItem {
    /// Human readable message
    pub message: String,
}

/// A GraphQL-style response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcResponse {
    /// Result data
    #[serde(default)]
    pub data: Value,
    /// Errors; any entry makes the call a failure
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RpcErrorItem>,
}

impl RpcResponse {
    /// Successful response.
    #[must_use]
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            errors: Vec::new(),
        }
    }

    /// Failed response with one error.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            data: Value::Null,
            errors: vec![RpcErrorItem {
                message: message.into(),
            }],
        }
    }

    /// `data`, or an [`TetherError::Rpc`] joining every error message.
    ///
    /// # Errors
    ///
    /// Returns `Rpc` if `errors` is non-empty.
    pub fn into_result(self) -> Result<Value> {
        if self.errors.is_empty() {
            return Ok(self.data);
        }
        let joined = self
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        Err(TetherError::Rpc(joined.into()))
    }
}

fn signed_bytes(timestamp: &str, payload: &[u8]) -> Vec<u8> {
    let mut message = Vec::with_capacity(timestamp.len() + payload.len());
    message.extend_from_slice(timestamp.as_bytes());
    message.extend_from_slice(payload);
    message
}

/// Sign `payload` and seal the envelope under `key`.
///
/// # Errors
///
/// Returns a crypto error if encryption fails.
pub fn seal_envelope(
    key: &AeadKey,
    signing_key: &SigningKey,
    payload: &[u8],
    timestamp_ms: i64,
) -> Result<Vec<u8>> {
    let timestamp = timestamp_ms.to_string();
    let signature = signing_key.sign(&signed_bytes(&timestamp, payload)).to_base64();

    let mut body = Vec::with_capacity(timestamp.len() + signature.len() + payload.len() + 2);
    body.extend_from_slice(timestamp.as_bytes());
    body.push(FIELD_SEPARATOR as u8);
    body.extend_from_slice(signature.as_bytes());
    body.push(FIELD_SEPARATOR as u8);
    body.extend_from_slice(payload);
    Ok(key.seal(&body)?)
}

/// A decrypted envelope whose signature has not been checked yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    /// Claimed send time (ms since Unix epoch)
    pub timestamp: i64,
    /// Base64 signature
    pub signature: String,
    /// Request payload
    pub payload: Vec<u8>,
}

impl Envelope {
    /// Check freshness and the signature against the caller's stored key.
    #[must_use]
    pub fn verify(&self, signer: &VerifyingKey, now_ms: i64, tolerance: Duration) -> Verification {
        let message = signed_bytes(&self.timestamp.to_string(), &self.payload);
        verify_signed(
            &message,
            &signer.to_base64(),
            &self.signature,
            self.timestamp,
            now_ms,
            tolerance,
        )
    }
}

/// Decrypt and split an envelope.
///
/// # Errors
///
/// Returns `Crypto` if decryption fails and `Authentication` if the plaintext
/// is not a well-formed envelope.
pub fn open_envelope(key: &AeadKey, sealed: &[u8]) -> Result<Envelope> {
    let plain = key.open(sealed)?;
    let mut parts = plain.splitn(3, |b| *b == FIELD_SEPARATOR as u8);
    let (Some(ts), Some(sig), Some(payload)) = (parts.next(), parts.next(), parts.next()) else {
        return Err(TetherError::authentication("malformed envelope"));
    };
    let timestamp = std::str::from_utf8(ts)
        .ok()
        .and_then(|t| t.parse::<i64>().ok())
        .ok_or(TetherError::authentication("malformed envelope timestamp"))?;
    let signature = String::from_utf8(sig.to_vec())
        .map_err(|_| TetherError::authentication("malformed envelope signature"))?;

    Ok(Envelope {
        timestamp,
        signature,
        payload: payload.to_vec(),
    })
}

/// URL of `path` on a peer's HTTP service. IPv6 hosts are bracketed.
///
/// # Errors
///
/// Returns `InvalidConfig` if the result is not a valid URL.
pub fn peer_endpoint(scheme: &str, ip: IpAddr, port: u16, path: &str) -> Result<Url> {
    Ok(Url::parse(&format!(
        "{scheme}://{}{path}",
        SocketAddr::new(ip, port)
    ))?)
}
