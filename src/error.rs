//! Error types for the retrieval engine

use std::sync::Arc;

use dimse::DimseError;
use thiserror::Error;

use crate::models::RecordKind;

/// Result type alias for retrieval operations
pub type Result<T> = std::result::Result<T, RetrieveError>;

#[derive(Error, Debug)]
pub enum RetrieveError {
    /// A required input is absent or unusable
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// An object was used outside its lifecycle, or a declaration is inconsistent
    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    #[error("Network error: {0}")]
    Network(#[from] DimseError),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Raised once every sub-request of a live load resolved
    #[error("{kind} retrieval failed: {} error(s) across {total} sub-request(s)", failures.len())]
    SubRequests {
        kind: RecordKind,
        total: usize,
        failures: Vec<RetrieveError>,
    },

    /// Failure of a load shared between concurrent callers
    #[error(transparent)]
    Shared(Arc<RetrieveError>),
}

impl RetrieveError {
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn cache(msg: impl Into<String>) -> Self {
        Self::Cache(msg.into())
    }

    /// Unwrap a shared failure when this caller holds the last reference
    pub(crate) fn from_shared(err: Arc<RetrieveError>) -> Self {
        Arc::try_unwrap(err).unwrap_or_else(RetrieveError::Shared)
    }

    /// The error with any sharing wrapper removed
    pub fn root(&self) -> &RetrieveError {
        match self {
            RetrieveError::Shared(inner) => inner.root(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_shared_unwraps_unique() {
        let err = RetrieveError::from_shared(Arc::new(RetrieveError::invalid_state("done")));
        assert!(matches!(err, RetrieveError::InvalidState(_)));
    }

    #[test]
    fn test_from_shared_keeps_wrapper_when_shared() {
        let shared = Arc::new(RetrieveError::cache("locked"));
        let other = Arc::clone(&shared);
        let err = RetrieveError::from_shared(shared);
        assert!(matches!(err, RetrieveError::Shared(_)));
        assert!(matches!(err.root(), RetrieveError::Cache(_)));
        assert_eq!(err.to_string(), other.to_string());
    }

    #[test]
    fn test_sub_request_message() {
        let err = RetrieveError::SubRequests {
            kind: RecordKind::Study,
            total: 4,
            failures: vec![RetrieveError::cache("full")],
        };
        assert_eq!(
            err.to_string(),
            "study retrieval failed: 1 error(s) across 4 sub-request(s)"
        );
    }
}
