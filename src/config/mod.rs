//! TOML configuration for the retrieval engine

mod logging_config;
mod node_config;
pub mod config;

pub use config::{CacheConfig, Config, ConfigError, RetrieveConfig};
pub use logging_config::LoggingConfig;
pub use node_config::{LocalConfig, RemoteConfig};
