//! Error types for Tether core
//!
//! Errors are categorized to support caller decisions. Nothing in this crate
//! retries on its own; callers use the classification to decide.
//!
//! # Error Categories
//!
//! - **Transient**: may succeed if the user tries again (network, timeouts)
//! - **Permanent**: will not succeed without intervention (not paired, bad config)
//!
//! # Example
//!
//! ```
//! use tether_core::TetherError;
//!
//! let err = TetherError::NotPaired("device-b".into());
//! assert!(err.is_permanent());
//! assert_eq!(err.http_status(), 403);
//! ```

use std::borrow::Cow;
use std::net::IpAddr;
use tether_crypto::CryptoError;
use tether_discovery::DiscoveryError;
use tether_transport::TransportError;
use thiserror::Error;

/// Errors that can occur in Tether core operations
#[derive(Debug, Error, Clone)]
pub enum TetherError {
    // ============ Network Errors ============
    /// UDP transport failure
    #[error("Transport error: {0}")]
    Transport(Cow<'static, str>),

    /// HTTP request failed before a response arrived
    #[error("Network error: {0}")]
    Network(Cow<'static, str>),

    /// Peer answered with a non-success HTTP status
    #[error("Peer returned HTTP {status}")]
    HttpStatus {
        /// Status code
        status: u16,
    },

    /// Refusing to contact an address outside the LAN
    #[error("Address {0} is not LAN-scoped")]
    NotLanAddress(IpAddr),

    /// Discovery failure
    #[error("Discovery error: {0}")]
    Discovery(Cow<'static, str>),

    // ============ Security Errors ============
    /// Cryptographic operation failed
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Signature or timestamp check failed
    #[error("Authentication failed: {0}")]
    Authentication(Cow<'static, str>),

    /// Pairing handshake failed
    #[error("Pairing failed: {0}")]
    Pairing(Cow<'static, str>),

    // ============ Peer Errors ============
    /// No record for this peer id
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    /// Peer is known but not paired
    #[error("Peer not paired: {0}")]
    NotPaired(String),

    /// Insert of an id that already exists
    #[error("Peer already exists: {0}")]
    PeerExists(String),

    // ============ RPC Errors ============
    /// Remote handler reported errors
    #[error("Remote call failed: {0}")]
    Rpc(Cow<'static, str>),

    // ============ Transfer Errors ============
    /// Transfer task not found
    #[error("Transfer not found: {0}")]
    TransferNotFound(String),

    /// Downloaded size differs from the announced size
    #[error("Size mismatch: expected {expected} bytes, received {received}")]
    SizeMismatch {
        /// Announced size
        expected: u64,
        /// Bytes received
        received: u64,
    },

    // ============ Storage & State Errors ============
    /// File I/O error
    #[error("File I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(Cow<'static, str>),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(Cow<'static, str>),

    /// Operation not allowed in the current state
    #[error("Invalid state: {0}")]
    InvalidState(Cow<'static, str>),

    /// Channel send/receive error
    #[error("Channel error: {0}")]
    Channel(Cow<'static, str>),

    /// Operation timed out
    #[error("Operation timed out: {0}")]
    Timeout(Cow<'static, str>),
}

impl TetherError {
    /// Returns true if trying again later may succeed
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TetherError::Transport(_)
                | TetherError::Network(_)
                | TetherError::Timeout(_)
                | TetherError::Channel(_)
                | TetherError::Io(_)
        ) || matches!(self, TetherError::HttpStatus { status } if *status >= 500)
    }

    /// Returns true if this error will not go away without intervention
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            TetherError::InvalidConfig(_)
                | TetherError::PeerNotFound(_)
                | TetherError::NotPaired(_)
                | TetherError::PeerExists(_)
                | TetherError::NotLanAddress(_)
                | TetherError::TransferNotFound(_)
                | TetherError::InvalidState(_)
                | TetherError::Authentication(_)
        )
    }

    /// Status an HTTP layer should answer with for this error.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            TetherError::Authentication(_) | TetherError::Crypto(_) => 401,
            TetherError::PeerNotFound(_) | TetherError::NotPaired(_) => 403,
            TetherError::Serialization(_) => 400,
            TetherError::TransferNotFound(_) => 404,
            _ => 500,
        }
    }

    /// Create an authentication error with static context (zero allocation)
    #[must_use]
    pub const fn authentication(context: &'static str) -> Self {
        TetherError::Authentication(Cow::Borrowed(context))
    }

    /// Create a pairing error with static context (zero allocation)
    #[must_use]
    pub const fn pairing(context: &'static str) -> Self {
        TetherError::Pairing(Cow::Borrowed(context))
    }

    /// Create an invalid state error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_state(context: &'static str) -> Self {
        TetherError::InvalidState(Cow::Borrowed(context))
    }

    /// Create a channel error with static context (zero allocation)
    #[must_use]
    pub const fn channel(context: &'static str) -> Self {
        TetherError::Channel(Cow::Borrowed(context))
    }

    /// Create an invalid config error with static context (zero allocation)
    #[must_use]
    pub const fn invalid_config(context: &'static str) -> Self {
        TetherError::InvalidConfig(Cow::Borrowed(context))
    }
}

impl From<CryptoError> for TetherError {
    fn from(err: CryptoError) -> Self {
        TetherError::Crypto(err.to_string())
    }
}

impl From<TransportError> for TetherError {
    fn from(err: TransportError) -> Self {
        TetherError::Transport(Cow::Owned(err.to_string()))
    }
}

impl From<DiscoveryError> for TetherError {
    fn from(err: DiscoveryError) -> Self {
        TetherError::Discovery(Cow::Owned(err.to_string()))
    }
}

impl From<std::io::Error> for TetherError {
    fn from(err: std::io::Error) -> Self {
        TetherError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for TetherError {
    fn from(err: serde_json::Error) -> Self {
        TetherError::Serialization(Cow::Owned(err.to_string()))
    }
}

impl From<reqwest::Error> for TetherError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TetherError::Timeout(Cow::Owned(err.to_string()))
        } else if let Some(status) = err.status() {
            TetherError::HttpStatus {
                status: status.as_u16(),
            }
        } else {
            TetherError::Network(Cow::Owned(err.to_string()))
        }
    }
}

impl From<url::ParseError> for TetherError {
    fn from(err: url::ParseError) -> Self {
        TetherError::InvalidConfig(Cow::Owned(err.to_string()))
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, TetherError>;
