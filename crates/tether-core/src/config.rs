//! Node configuration

use crate::error::{Result, TetherError};
use std::net::SocketAddr;
use std::time::Duration;

pub use tether_discovery::DiscoveryConfig;

/// Default unicast port every node binds.
pub const DEFAULT_UNICAST_PORT: u16 = 52353;

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Unicast socket address (source of all sends, target of all replies)
    pub unicast_addr: SocketAddr,

    /// Discovery configuration
    pub discovery: DiscoveryConfig,

    /// Pairing configuration
    pub pairing: PairingConfig,

    /// Peer RPC configuration
    pub rpc: RpcConfig,

    /// Transfer configuration
    pub transfer: TransferConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            unicast_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_UNICAST_PORT)),
            discovery: DiscoveryConfig::default(),
            pairing: PairingConfig::default(),
            rpc: RpcConfig::default(),
            transfer: TransferConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Validate every section.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.discovery.validate()?;
        self.pairing.validate()?;
        self.rpc.validate()?;
        self.transfer.validate()
    }
}

/// Pairing configuration
#[derive(Debug, Clone)]
pub struct PairingConfig {
    /// Maximum accepted clock skew on signed messages
    pub timestamp_tolerance: Duration,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            timestamp_tolerance: Duration::from_secs(5 * 60),
        }
    }
}

impl PairingConfig {
    fn validate(&self) -> Result<()> {
        if self.timestamp_tolerance.is_zero() {
            return Err(TetherError::invalid_config(
                "timestamp tolerance must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Peer RPC and file endpoint configuration
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// URL scheme for peer endpoints ("https" or "http")
    pub scheme: String,

    /// Whole-request timeout for RPC calls
    pub request_timeout: Duration,

    /// Refuse to contact peers outside LAN address ranges
    pub lan_only: bool,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            scheme: "https".to_owned(),
            request_timeout: Duration::from_secs(30),
            lan_only: true,
        }
    }
}

impl RpcConfig {
    fn validate(&self) -> Result<()> {
        if self.scheme != "https" && self.scheme != "http" {
            return Err(TetherError::InvalidConfig(
                format!("unsupported scheme {:?}", self.scheme).into(),
            ));
        }
        if self.request_timeout.is_zero() {
            return Err(TetherError::invalid_config("request timeout must be non-zero"));
        }
        Ok(())
    }
}

/// Transfer manager configuration
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Number of download workers (maximum simultaneous downloads)
    pub max_concurrent: usize,

    /// Capacity of the work queue
    pub queue_capacity: usize,

    /// Read size when streaming a download to disk
    pub read_chunk_size: usize,

    /// Minimum interval between throughput samples
    pub progress_interval: Duration,

    /// Timeout for establishing a download connection
    pub connect_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            queue_capacity: 64,
            read_chunk_size: 8 * 1024,
            progress_interval: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl TransferConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(TetherError::invalid_config("max_concurrent must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(TetherError::invalid_config("queue capacity must be at least 1"));
        }
        if self.read_chunk_size == 0 {
            return Err(TetherError::invalid_config("read chunk size must be non-zero"));
        }
        Ok(())
    }
}
