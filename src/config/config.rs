use std::path::{Path, PathBuf};

use dimse::{DimseConfig, RemoteNode};
use serde::Deserialize;
use thiserror::Error;

use crate::config::{LocalConfig, LoggingConfig, RemoteConfig};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("./tmp/cache.redb")
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrieveConfig {
    /// Matches kept per clause set; 0 means unlimited
    #[serde(default)]
    pub max_results: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub local: LocalConfig,
    pub remote: RemoteConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retrieve: RetrieveConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str(&raw)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.logging.validate()?;
        self.local.validate()?;
        self.remote.validate()?;
        if self.cache.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("cache.path must not be empty".into()));
        }
        Ok(())
    }

    /// Settings for the dimse SCU and store listener
    pub fn dimse_config(&self) -> DimseConfig {
        let mut config = DimseConfig {
            local_aet: self.local.ae_title.clone(),
            port: self.local.port,
            storage_dir: self.local.storage_dir.clone(),
            ..DimseConfig::default()
        };
        if let Some(timeout) = self.remote.timeout_ms {
            config.connect_timeout_ms = timeout;
        }
        config
    }

    pub fn remote_node(&self) -> RemoteNode {
        let node = RemoteNode::new(&self.remote.ae_title, &self.remote.host, self.remote.port);
        match self.remote.timeout_ms {
            Some(timeout) => node.with_timeout(timeout),
            None => node,
        }
    }
}
