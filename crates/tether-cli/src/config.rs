//! Configuration file for the Tether CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tether_core::NodeConfig;
use tether_core::config::DEFAULT_UNICAST_PORT;

/// Tether CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// This device
    #[serde(default)]
    pub device: DeviceConfig,
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,
    /// Transfer configuration
    #[serde(default)]
    pub transfer: TransferConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// This device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Advertised name
    #[serde(default = "default_device_name")]
    pub name: String,
    /// Advertised device type
    #[serde(default = "default_device_type")]
    pub device_type: String,
    /// Port of the HTTP service (RPC and file endpoint)
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Identity and peer store location
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Where received files go
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

/// Network configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Unicast UDP bind address
    #[serde(default = "default_unicast_addr")]
    pub unicast_addr: String,
    /// Multicast group
    #[serde(default = "default_multicast_group")]
    pub multicast_group: Ipv4Addr,
    /// Multicast port
    #[serde(default = "default_multicast_port")]
    pub multicast_port: u16,
    /// Seconds between discovery broadcasts
    #[serde(default = "default_broadcast_interval")]
    pub broadcast_interval_secs: u64,
    /// Peer endpoint scheme: "https" (self-signed TLS) or "http"
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Refuse to contact peers outside the LAN
    #[serde(default = "default_true")]
    pub lan_only: bool,
}

/// Transfer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum simultaneous downloads
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Read size when writing downloads
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_device_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "tether-device".to_string())
}

fn default_device_type() -> String {
    "desktop".to_string()
}

fn default_http_port() -> u16 {
    8443
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("tether")
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("tether")
}

fn default_unicast_addr() -> String {
    format!("0.0.0.0:{DEFAULT_UNICAST_PORT}")
}

fn default_multicast_group() -> Ipv4Addr {
    tether_discovery::engine::DEFAULT_MULTICAST_GROUP
}

fn default_multicast_port() -> u16 {
    tether_discovery::engine::DEFAULT_MULTICAST_PORT
}

fn default_broadcast_interval() -> u64 {
    5
}

fn default_scheme() -> String {
    "https".to_string()
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    3
}

fn default_read_chunk_size() -> usize {
    8 * 1024
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            device_type: default_device_type(),
            http_port: default_http_port(),
            data_dir: default_data_dir(),
            download_dir: default_download_dir(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            unicast_addr: default_unicast_addr(),
            multicast_group: default_multicast_group(),
            multicast_port: default_multicast_port(),
            broadcast_interval_secs: default_broadcast_interval(),
            scheme: default_scheme(),
            lan_only: true,
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("tether/config.toml")
    }

    /// Load config from default path, or create default if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_default() -> anyhow::Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load(&path)
        } else {
            let config = Self::default();
            config.save(&path)?;
            Ok(config)
        }
    }

    /// Identity file inside the data directory.
    #[must_use]
    pub fn identity_path(&self) -> PathBuf {
        self.device.data_dir.join("identity.json")
    }

    /// Peer store file inside the data directory.
    #[must_use]
    pub fn peers_path(&self) -> PathBuf {
        self.device.data_dir.join("peers.json")
    }

    /// Certificate of the peer endpoint inside the data directory.
    #[must_use]
    pub fn tls_cert_path(&self) -> PathBuf {
        self.device.data_dir.join("endpoint.crt")
    }

    /// Private key of the peer endpoint inside the data directory.
    #[must_use]
    pub fn tls_key_path(&self) -> PathBuf {
        self.device.data_dir.join("endpoint.key")
    }

    /// Parse the unicast address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn parse_unicast_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.network.unicast_addr.parse()?)
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.parse_unicast_addr()?;

        if self.device.name.trim().is_empty() {
            anyhow::bail!("Device name must not be empty");
        }

        if self.device.http_port == 0 {
            anyhow::bail!("HTTP port must be non-zero");
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.transfer.max_concurrent == 0 || self.transfer.max_concurrent > 64 {
            anyhow::bail!("Max concurrent transfers must be between 1 and 64");
        }

        if self.transfer.read_chunk_size == 0 || self.transfer.read_chunk_size > 16 * 1024 * 1024 {
            anyhow::bail!("Read chunk size must be between 1 byte and 16MB");
        }

        self.to_node_config()?.validate()?;
        Ok(())
    }

    /// Build the core node configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the unicast address cannot be parsed.
    pub fn to_node_config(&self) -> anyhow::Result<NodeConfig> {
        let mut node = NodeConfig {
            unicast_addr: self.parse_unicast_addr()?,
            ..NodeConfig::default()
        };
        node.discovery.multicast_group = self.network.multicast_group;
        node.discovery.multicast_port = self.network.multicast_port;
        node.discovery.broadcast_interval = Duration::from_secs(self.network.broadcast_interval_secs);
        node.rpc.scheme.clone_from(&self.network.scheme);
        node.rpc.lan_only = self.network.lan_only;
        node.transfer.max_concurrent = self.transfer.max_concurrent;
        node.transfer.read_chunk_size = self.transfer.read_chunk_size;
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.unicast_addr, "0.0.0.0:52353");
        assert_eq!(config.network.scheme, "https");
        assert_eq!(config.transfer.max_concurrent, 3);
        assert!(config.network.lan_only);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();

        config.logging.level = "loud".to_string();
        assert!(config.validate().is_err());

        config.logging.level = "debug".to_string();
        config.transfer.max_concurrent = 0;
        assert!(config.validate().is_err());

        config.transfer.max_concurrent = 2;
        config.network.scheme = "ftp".to_string();
        assert!(config.validate().is_err());

        config.network.scheme = "http".to_string();
        config.network.unicast_addr = "nonsense".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_node_config_conversion() {
        let mut config = Config::default();
        config.network.broadcast_interval_secs = 9;
        config.network.scheme = "http".to_string();
        config.transfer.max_concurrent = 5;

        let node = config.to_node_config().unwrap();
        assert_eq!(node.discovery.broadcast_interval, Duration::from_secs(9));
        assert_eq!(node.rpc.scheme, "http");
        assert_eq!(node.transfer.max_concurrent, 5);
        assert_eq!(node.unicast_addr.port(), 52353);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str("[device]\nname = \"kitchen\"\n").unwrap();
        assert_eq!(config.device.name, "kitchen");
        assert_eq!(config.device.http_port, 8443);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/config.toml");
        let mut config = Config::default();
        config.device.name = "desk".to_string();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.device.name, "desk");
        assert_eq!(loaded.network.multicast_port, config.network.multicast_port);
        assert_eq!(loaded.identity_path(), config.identity_path());
    }
}
