//! Configuration types for DIMSE services

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::DEFAULT_STORE_PORT;

/// Configuration for the local side of a DIMSE session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseConfig {
    /// Local Application Entity Title (also the C-MOVE destination)
    pub local_aet: String,

    /// Port the inbound store listener binds to
    #[serde(default = "default_port")]
    pub port: u16,

    /// Maximum PDU size in bytes
    #[serde(default = "default_max_pdu")]
    pub max_pdu: u32,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Directory received and extracted DICOM files are written to
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,

    /// How often the store listener polls its storage directory
    #[serde(default = "default_scan_interval")]
    pub scan_interval_ms: u64,
}

/// Configuration for a remote DICOM node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Remote Application Entity Title
    pub ae_title: String,

    /// Remote host address
    pub host: String,

    /// Remote port
    pub port: u16,

    /// Connection timeout in milliseconds (overrides global setting)
    pub connect_timeout_ms: Option<u64>,

    /// Maximum PDU size for this node (overrides global setting)
    pub max_pdu: Option<u32>,
}

impl Default for DimseConfig {
    fn default() -> Self {
        Self {
            local_aet: "RETRIEVER_SCU".to_string(),
            port: default_port(),
            max_pdu: default_max_pdu(),
            connect_timeout_ms: default_connect_timeout(),
            storage_dir: default_storage_dir(),
            scan_interval_ms: default_scan_interval(),
        }
    }
}

impl DimseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Get the storage directory poll interval as Duration
    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms.max(1))
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_ae_title("Local", &self.local_aet)?;

        if self.port == 0 {
            return Err(crate::error::DimseError::config(
                "Port must be greater than 0",
            ));
        }

        if self.max_pdu < 16384 || self.max_pdu > 131072 {
            return Err(crate::error::DimseError::config(
                "Max PDU size must be between 16384 and 131072 bytes",
            ));
        }

        if !self.storage_dir.exists() {
            std::fs::create_dir_all(&self.storage_dir).map_err(|e| {
                crate::error::DimseError::config(format!(
                    "Failed to create storage directory: {}",
                    e
                ))
            })?;
        }

        Ok(())
    }
}

impl RemoteNode {
    /// Create a new remote node configuration
    pub fn new(ae_title: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            ae_title: ae_title.into(),
            host: host.into(),
            port,
            connect_timeout_ms: None,
            max_pdu: None,
        }
    }

    /// Set connection timeout for this node
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = Some(timeout_ms);
        self
    }

    /// Validate the remote node configuration
    pub fn validate(&self) -> crate::error::Result<()> {
        validate_ae_title("Remote", &self.ae_title)?;

        if self.host.is_empty() {
            return Err(crate::error::DimseError::config(
                "Remote host cannot be empty",
            ));
        }

        if self.port == 0 {
            return Err(crate::error::DimseError::config(
                "Remote port must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn validate_ae_title(side: &str, aet: &str) -> crate::error::Result<()> {
    if aet.trim().is_empty() || aet.len() > 16 {
        return Err(crate::error::DimseError::config(format!(
            "{} AE title must be 1-16 characters",
            side
        )));
    }
    Ok(())
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_STORE_PORT
}

fn default_max_pdu() -> u32 {
    65536
}

fn default_connect_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./tmp/dimse")
}

fn default_scan_interval() -> u64 {
    250
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = DimseConfig::default();
        assert_eq!(config.local_aet, "RETRIEVER_SCU");
        assert_eq!(config.port, DEFAULT_STORE_PORT);
        assert_eq!(config.scan_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_remote_node_builder() {
        let node = RemoteNode::new("TEST_AET", "localhost", 11112).with_timeout(10_000);

        assert_eq!(node.ae_title, "TEST_AET");
        assert_eq!(node.host, "localhost");
        assert_eq!(node.port, 11112);
        assert_eq!(node.connect_timeout_ms, Some(10_000));
        assert!(node.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = DimseConfig {
            storage_dir: temp_dir.path().join("store"),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        assert!(config.storage_dir.exists());

        config.local_aet = "".to_string();
        assert!(config.validate().is_err());

        config.local_aet = "A".repeat(17);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remote_node_rejects_empty_host() {
        let node = RemoteNode::new("PACS", "", 104);
        assert!(node.validate().is_err());
    }
}
