//! Discovery errors.

use tether_crypto::CryptoError;
use tether_transport::TransportError;
use thiserror::Error;

/// Discovery errors
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// Socket or packet codec failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Sealing a directed query failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Configuration error
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}
