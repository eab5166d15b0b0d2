use std::path::PathBuf;

use serde::Deserialize;

use crate::config::ConfigError;

/// The local application entity and its inbound store listener
#[derive(Debug, Clone, Deserialize)]
pub struct LocalConfig {
    #[serde(default = "default_local_aet")]
    pub ae_title: String,
    /// Port the store listener binds for C-MOVE destinations
    #[serde(default = "default_store_port")]
    pub port: u16,
    #[serde(default = "default_storage_dir")]
    pub storage_dir: PathBuf,
}

fn default_local_aet() -> String {
    "RETRIEVER_SCU".to_string()
}

fn default_store_port() -> u16 {
    dimse::DEFAULT_STORE_PORT
}

fn default_storage_dir() -> PathBuf {
    PathBuf::from("./tmp/dimse")
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            ae_title: default_local_aet(),
            port: default_store_port(),
            storage_dir: default_storage_dir(),
        }
    }
}

impl LocalConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_aet("local.ae_title", &self.ae_title)?;
        if self.port == 0 {
            return Err(ConfigError::Invalid("local.port must be greater than 0".into()));
        }
        Ok(())
    }
}

/// The archive queried and moved from
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
    pub ae_title: String,
    pub host: String,
    #[serde(default = "default_remote_port")]
    pub port: u16,
    /// Connection timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_remote_port() -> u16 {
    dimse::DEFAULT_DIMSE_PORT
}

impl RemoteConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_aet("remote.ae_title", &self.ae_title)?;
        if self.host.trim().is_empty() {
            return Err(ConfigError::Invalid("remote.host must not be empty".into()));
        }
        if self.port == 0 {
            return Err(ConfigError::Invalid("remote.port must be greater than 0".into()));
        }
        Ok(())
    }
}

fn validate_aet(field: &str, aet: &str) -> Result<(), ConfigError> {
    if aet.is_empty() || aet.len() > 16 {
        return Err(ConfigError::Invalid(format!(
            "{} must be 1-16 characters, got {:?}",
            field, aet
        )));
    }
    Ok(())
}
