//! Pairing wire messages and their canonical signed strings.

use crate::context::DeviceContext;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tether_crypto::agreement::PublicKey;
use tether_crypto::signatures::SigningKey;
use tether_crypto::verify::{Verification, canonical, verify_signed};

/// A message carrying a timestamp and an Ed25519 signature over its fields.
pub trait SignedMessage {
    /// `|`-joined fields covered by the signature.
    fn signed_payload(&self) -> String;

    /// Embedded signer key (standard base64).
    fn signer_key(&self) -> &str;

    /// Signature (standard base64).
    fn signature(&self) -> &str;

    /// Send time in milliseconds since the Unix epoch.
    fn timestamp(&self) -> i64;

    /// Check timestamp freshness, then the signature against the embedded key.
    fn verify(&self, now_ms: i64, tolerance: Duration) -> Verification {
        verify_signed(
            self.signed_payload().as_bytes(),
            self.signer_key(),
            self.signature(),
            self.timestamp(),
            now_ms,
            tolerance,
        )
    }
}

/// Body of a `PAIR_REQUEST` datagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingRequest {
    /// Sender device id
    pub from_id: String,
    /// Sender display name
    pub from_name: String,
    /// Sender HTTP service port
    pub port: u16,
    /// Sender device type
    pub device_type: String,
    /// Ephemeral X25519 public key (base64)
    pub ecdh_public_key: String,
    /// Long-lived Ed25519 public key (base64)
    pub signature_public_key: String,
    /// Send time (ms since Unix epoch)
    pub timestamp: i64,
    /// Signature over the canonical fields (base64)
    pub signature: String,
}

impl PairingRequest {
    /// Build and sign a request from `ctx` offering `ecdh_public`.
    #[must_use]
    pub fn new(ctx: &DeviceContext, ecdh_public: &PublicKey, timestamp: i64) -> Self {
        let mut request = Self {
            from_id: ctx.id().to_owned(),
            from_name: ctx.name().to_owned(),
            port: ctx.port(),
            device_type: ctx.device_type().to_owned(),
            ecdh_public_key: ecdh_public.to_base64(),
            signature_public_key: ctx.verifying_key().to_base64(),
            timestamp,
            signature: String::new(),
        };
        request.sign(ctx.signing_key());
        request
    }

    /// (Re)compute the signature with `key`.
    pub fn sign(&mut self, key: &SigningKey) {
        self.signature = key.sign(self.signed_payload().as_bytes()).to_base64();
    }
}

impl SignedMessage for PairingRequest {
    fn signed_payload(&self) -> String {
        canonical(&[
            &self.from_id,
            &self.from_name,
            &self.port.to_string(),
            &self.device_type,
            &self.ecdh_public_key,
            &self.signature_public_key,
            &self.timestamp.to_string(),
        ])
    }

    fn signer_key(&self) -> &str {
        &self.signature_public_key
    }

    fn signature(&self) -> &str {
        &self.signature
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Body of a `PAIR_RESPONSE` datagram.
///
/// A declined response is still signed and carries an empty `ecdhPublicKey`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingResponse {
    /// Sender device id
    pub from_id: String,
    /// Recipient device id
    pub to_id: String,
    /// Sender HTTP service port
    pub port: u16,
    /// Sender device type
    pub device_type: String,
    /// Ephemeral X25519 public key (base64)
    pub ecdh_public_key: String,
    /// Long-lived Ed25519 public key (base64)
    pub signature_public_key: String,
    /// Whether the request was accepted
    pub accepted: bool,
    /// Send time (ms since Unix epoch)
    pub timestamp: i64,
    /// Signature over the canonical fields (base64)
    pub signature: String,
}

impl PairingResponse {
    /// Signed acceptance addressed to `to_id`.
    #[must_use]
    pub fn accept(ctx: &DeviceContext, to_id: &str, ecdh_public: &PublicKey, timestamp: i64) -> Self {
        Self::build(ctx, to_id, ecdh_public.to_base64(), true, timestamp)
    }

    /// Signed refusal addressed to `to_id`.
    #[must_use]
    pub fn decline(ctx: &DeviceContext, to_id: &str, timestamp: i64) -> Self {
        Self::build(ctx, to_id, String::new(), false, timestamp)
    }

    fn build(
        ctx: &DeviceContext,
        to_id: &str,
        ecdh_public_key: String,
        accepted: bool,
        timestamp: i64,
    ) -> Self {
        let mut response = Self {
            from_id: ctx.id().to_owned(),
            to_id: to_id.to_owned(),
            port: ctx.port(),
            device_type: ctx.device_type().to_owned(),
            ecdh_public_key,
            signature_public_key: ctx.verifying_key().to_base64(),
            accepted,
            timestamp,
            signature: String::new(),
        };
        response.sign(ctx.signing_key());
        response
    }

    /// (Re)compute the signature with `key`.
    pub fn sign(&mut self, key: &SigningKey) {
        self.signature = key.sign(self.signed_payload().as_bytes()).to_base64();
    }
}

impl SignedMessage for PairingResponse {
    fn signed_payload(&self) -> String {
        canonical(&[
            &self.from_id,
            &self.to_id,
            &self.port.to_string(),
            &self.device_type,
            &self.ecdh_public_key,
            &self.signature_public_key,
            if self.accepted { "true" } else { "false" },
            &self.timestamp.to_string(),
        ])
    }

    fn signer_key(&self) -> &str {
        &self.signature_public_key
    }

    fn signature(&self) -> &str {
        &self.signature
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// Body of a `PAIR_CANCEL` datagram. Unsigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingCancel {
    /// Sender device id
    pub from_id: String,
    /// Recipient device id
    pub to_id: String,
}
