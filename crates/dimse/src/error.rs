//! Error types for DIMSE operations

use thiserror::Error;

/// Result type alias for DIMSE operations
pub type Result<T> = std::result::Result<T, DimseError>;

/// Error types that can occur during DIMSE operations
#[derive(Error, Debug)]
pub enum DimseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("DICOM object error: {0}")]
    DicomObject(String),

    #[error("DIMSE operation failed: {0}")]
    OperationFailed(String),

    #[error("Operation not supported: {0}")]
    NotSupported(String),

    #[error("{} of {total} queued requests failed", failures.len())]
    Partial {
        total: usize,
        failures: Vec<DimseError>,
    },
}

impl DimseError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new operation failed error
    pub fn operation_failed(msg: impl Into<String>) -> Self {
        Self::OperationFailed(msg.into())
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            DimseError::Network(_) => true,
            DimseError::Partial { failures, .. } => failures.iter().all(|e| e.is_recoverable()),
            _ => false,
        }
    }
}
