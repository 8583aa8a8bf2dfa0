//! The local device, passed explicitly to every engine.

use crate::identity::DeviceIdentity;
use std::sync::atomic::{AtomicBool, Ordering};
use tether_crypto::signatures::{SigningKey, VerifyingKey};
use tether_discovery::{DeviceInfo, LocalDevice};

/// Everything the engines need to know about this device.
#[derive(Debug)]
pub struct DeviceContext {
    info: DeviceInfo,
    identity: DeviceIdentity,
    discoverable: AtomicBool,
}

impl DeviceContext {
    /// Build a context for `identity` advertising `name` and HTTP `port`.
    ///
    /// Devices start discoverable.
    #[must_use]
    pub fn new(identity: DeviceIdentity, name: impl Into<String>, port: u16) -> Self {
        Self {
            info: DeviceInfo::new(identity.id(), name, port),
            identity,
            discoverable: AtomicBool::new(true),
        }
    }

    /// Override the advertised device type.
    #[must_use]
    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.info.device_type = device_type.into();
        self
    }

    /// Override the advertised platform.
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.info.platform = platform.into();
        self
    }

    /// Override the advertised application version.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.info.version = version.into();
        self
    }

    /// Set the initial discoverable flag.
    #[must_use]
    pub fn with_discoverable(self, discoverable: bool) -> Self {
        self.discoverable.store(discoverable, Ordering::Relaxed);
        self
    }

    /// Device id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// HTTP service port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.info.port
    }

    /// Device type.
    #[must_use]
    pub fn device_type(&self) -> &str {
        &self.info.device_type
    }

    /// Advertised info.
    #[must_use]
    pub fn device_info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Long-lived signing key.
    #[must_use]
    pub fn signing_key(&self) -> &SigningKey {
        self.identity.signing_key()
    }

    /// Public half of the signing key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.identity.verifying_key()
    }

    /// Toggle whether generic discovery requests are answered.
    pub fn set_discoverable(&self, discoverable: bool) {
        self.discoverable.store(discoverable, Ordering::Relaxed);
    }
}

impl LocalDevice for DeviceContext {
    fn info(&self) -> DeviceInfo {
        self.info.clone()
    }

    fn is_discoverable(&self) -> bool {
        self.discoverable.load(Ordering::Relaxed)
    }
}
