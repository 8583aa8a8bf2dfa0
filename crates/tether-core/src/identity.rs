//! Device identity
//!
//! A device is identified by an opaque UUID and owns one long-lived Ed25519
//! signing key. Both are generated once and persisted; re-generating the
//! identity breaks every existing pairing.
//!
//! # Example
//!
//! ```
//! use tether_core::identity::DeviceIdentity;
//!
//! let identity = DeviceIdentity::generate();
//! assert_eq!(identity.id().len(), 36);
//! ```

use crate::error::{Result, TetherError};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tether_crypto::signatures::{SigningKey, VerifyingKey};

/// Device id plus signing key.
#[derive(Clone)]
pub struct DeviceIdentity {
    id: String,
    signing_key: SigningKey,
}

/// On-disk form: id and hex-encoded seed.
#[derive(Serialize, Deserialize)]
struct StoredIdentity {
    id: String,
    seed: String,
}

impl DeviceIdentity {
    /// Generate a fresh identity.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Build from existing parts.
    #[must_use]
    pub fn from_parts(id: impl Into<String>, signing_key: SigningKey) -> Self {
        Self {
            id: id.into(),
            signing_key,
        }
    }

    /// Device id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Long-lived signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Public half of the signing key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Load an identity saved with [`DeviceIdentity::save`].
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let stored: StoredIdentity = serde_json::from_str(&text)?;
        let seed: [u8; 32] = hex::decode(&stored.seed)
            .map_err(|e| TetherError::Serialization(e.to_string().into()))?
            .try_into()
            .map_err(|_| TetherError::Serialization("identity seed must be 32 bytes".into()))?;
        Ok(Self::from_parts(stored.id, SigningKey::from_bytes(&seed)))
    }

    /// Save to `path`, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let stored = StoredIdentity {
            id: self.id.clone(),
            seed: hex::encode(self.signing_key.to_bytes()),
        };
        std::fs::write(path, serde_json::to_vec_pretty(&stored)?)?;
        Ok(())
    }

    /// Load from `path`, or generate and save a new identity if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file is unreadable or saving fails.
    pub fn load_or_generate(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }
        let identity = Self::generate();
        identity.save(path)?;
        tracing::info!(id = %identity.id, "generated new device identity");
        Ok(identity)
    }
}

impl std::fmt::Debug for DeviceIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceIdentity")
            .field("id", &self.id)
            .field("verifying_key", &self.verifying_key().to_base64())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = DeviceIdentity::generate();
        let b = DeviceIdentity::generate();
        assert_ne!(a.id(), b.id());
        assert_ne!(a.verifying_key(), b.verifying_key());
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/identity.json");

        let identity = DeviceIdentity::generate();
        identity.save(&path).unwrap();
        let loaded = DeviceIdentity::load(&path).unwrap();

        assert_eq!(loaded.id(), identity.id());
        assert_eq!(loaded.verifying_key(), identity.verifying_key());
    }

    #[test]
    fn test_load_or_generate_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");

        let first = DeviceIdentity::load_or_generate(&path).unwrap();
        let second = DeviceIdentity::load_or_generate(&path).unwrap();
        assert_eq!(first.id(), second.id());
    }

    #[test]
    fn test_load_rejects_short_seed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("identity.json");
        std::fs::write(&path, r#"{"id":"x","seed":"abcd"}"#).unwrap();
        assert!(matches!(
            DeviceIdentity::load(&path),
            Err(TetherError::Serialization(_))
        ));
    }

    #[test]
    fn test_debug_hides_seed() {
        let identity = DeviceIdentity::generate();
        let debug = format!("{identity:?}");
        assert!(!debug.contains(&hex::encode(identity.signing_key().to_bytes())));
    }
}
