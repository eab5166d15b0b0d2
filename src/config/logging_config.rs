use serde::Deserialize;

use crate::config::ConfigError;

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive; `RUST_LOG` takes precedence when set
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub log_to_file: bool,
    #[serde(default = "default_log_file_path")]
    pub log_file_path: String,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_log_file_path() -> String {
    "./tmp/retriever.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            log_to_file: false,
            log_file_path: default_log_file_path(),
        }
    }
}

impl LoggingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level.trim().is_empty() {
            return Err(ConfigError::Invalid("logging.level must not be empty".into()));
        }
        if self.log_to_file && self.log_file_path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "logging.log_file_path is required when log_to_file is set".into(),
            ));
        }
        Ok(())
    }
}
