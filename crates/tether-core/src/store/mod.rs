//! Peer store
//!
//! Durable records of known devices. A record's keys exist exactly when it is
//! paired; [`PairingState`] makes any other combination unrepresentable.
//!
//! Two implementations ship: [`MemoryPeerStore`] and [`FilePeerStore`].

mod file;
mod memory;

pub use file::FilePeerStore;
pub use memory::MemoryPeerStore;

use crate::error::{Result, TetherError};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::sync::Arc;
use tether_crypto::aead::AeadKey;
use tether_crypto::signatures::VerifyingKey;
use tether_crypto::verify::now_millis;
use tether_discovery::PeerKeyLookup;

/// Whether a peer is paired, and with which keys.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum PairingState {
    /// Known device without a pairing
    Unpaired,
    /// Paired device
    #[serde(rename_all = "camelCase")]
    Paired {
        /// SHA-256 of the pairing ECDH secret
        #[serde(with = "aead_key_base64")]
        symmetric_key: AeadKey,
        /// The peer's long-lived Ed25519 key
        #[serde(with = "verifying_key_base64")]
        signature_public_key: VerifyingKey,
    },
}

impl PairingState {
    /// Whether this is [`PairingState::Paired`].
    #[must_use]
    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Paired { .. })
    }
}

impl std::fmt::Debug for PairingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unpaired => f.write_str("Unpaired"),
            Self::Paired {
                signature_public_key,
                ..
            } => f
                .debug_struct("Paired")
                .field("symmetric_key", &"<redacted>")
                .field("signature_public_key", &signature_public_key.to_base64())
                .finish(),
        }
    }
}

/// A known remote device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerRecord {
    /// Stable device id
    pub id: String,
    /// Display name
    pub name: String,
    /// Last known address
    pub ip: IpAddr,
    /// HTTP service port
    pub port: u16,
    /// Device type
    pub device_type: String,
    /// Pairing status and keys
    #[serde(flatten)]
    pub pairing: PairingState,
    /// Creation time (ms since Unix epoch)
    pub created_at: i64,
    /// Last update time (ms since Unix epoch)
    pub updated_at: i64,
}

impl PeerRecord {
    /// Keys of a paired record.
    ///
    /// # Errors
    ///
    /// Returns `NotPaired` for an unpaired record.
    pub fn paired_keys(&self) -> Result<(&AeadKey, &VerifyingKey)> {
        match &self.pairing {
            PairingState::Paired {
                symmetric_key,
                signature_public_key,
            } => Ok((symmetric_key, signature_public_key)),
            PairingState::Unpaired => Err(TetherError::NotPaired(self.id.clone())),
        }
    }

    /// Whether this record is paired.
    #[must_use]
    pub fn is_paired(&self) -> bool {
        self.pairing.is_paired()
    }
}

/// Storage of [`PeerRecord`]s keyed by id.
pub trait PeerStore: Send + Sync {
    /// Record for `id`.
    fn get(&self, id: &str) -> Option<PeerRecord>;

    /// All records, ordered by id.
    fn all(&self) -> Vec<PeerRecord>;

    /// Paired records, ordered by id.
    fn all_paired(&self) -> Vec<PeerRecord> {
        self.all().into_iter().filter(PeerRecord::is_paired).collect()
    }

    /// Insert a new record.
    ///
    /// # Errors
    ///
    /// Returns `PeerExists` if the id is already stored.
    fn insert(&self, record: PeerRecord) -> Result<()>;

    /// Replace an existing record.
    ///
    /// # Errors
    ///
    /// Returns `PeerNotFound` if the id is not stored.
    fn update(&self, record: PeerRecord) -> Result<()>;

    /// Remove a record. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the removal fails.
    fn delete(&self, id: &str) -> Result<bool>;

    /// Remove several records. Returns how many existed.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting the removal fails.
    fn delete_many(&self, ids: &[String]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            if self.delete(id)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Insert `record`, or update in place keeping the original `created_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if persisting fails.
    fn upsert(&self, mut record: PeerRecord) -> Result<()> {
        match self.get(&record.id) {
            Some(existing) => {
                record.created_at = existing.created_at;
                record.updated_at = now_millis();
                self.update(record)
            }
            None => self.insert(record),
        }
    }
}

/// Exposes a store's pairing keys to the discovery listener.
#[derive(Clone)]
pub struct StoreKeyLookup(pub Arc<dyn PeerStore>);

impl PeerKeyLookup for StoreKeyLookup {
    fn shared_key(&self, peer_id: &str) -> Option<AeadKey> {
        let record = self.0.get(peer_id)?;
        match record.pairing {
            PairingState::Paired { symmetric_key, .. } => Some(symmetric_key),
            PairingState::Unpaired => None,
        }
    }
}

mod aead_key_base64 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use tether_crypto::aead::AeadKey;

    pub fn serialize<S: Serializer>(key: &AeadKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&tether_crypto::encode_base64(key.as_bytes()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<AeadKey, D::Error> {
        let text = String::deserialize(d)?;
        let bytes = tether_crypto::decode_base64(&text).map_err(D::Error::custom)?;
        AeadKey::from_slice(&bytes).map_err(D::Error::custom)
    }
}

mod verifying_key_base64 {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};
    use tether_crypto::signatures::VerifyingKey;

    pub fn serialize<S: Serializer>(key: &VerifyingKey, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&key.to_base64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<VerifyingKey, D::Error> {
        let text = String::deserialize(d)?;
        VerifyingKey::from_base64(&text).map_err(D::Error::custom)
    }
}
