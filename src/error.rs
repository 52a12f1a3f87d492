//! Error types for entity fetches and settings storage.
//!
//! Fetch failures never cross the `fetch_if_needed` boundary; they are
//! captured into [`State::Failed`](crate::State::Failed). Storage failures
//! surface from the raw [`KeyValueStore`](crate::KeyValueStore) API and are
//! downgraded to defaults by the typed settings layer.

use thiserror::Error;

/// Errors produced by this crate.
#[derive(Debug, Error)]
pub enum StateError {
    /// The data source could not produce a payload (network, decoding, ...).
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The payload was fetched but could not be mapped to the domain type.
    #[error("mapping failed: {0}")]
    Mapping(String),

    /// The data source or mapper panicked while loading.
    #[error("load panicked: {0}")]
    Panicked(String),

    /// The persistent backend could not be reached.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Invalid key format.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// Database error from SQLx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, StateError>;

impl StateError {
    /// Convenience constructor for data source implementations.
    pub fn fetch(reason: impl std::fmt::Display) -> Self {
        StateError::Fetch(reason.to_string())
    }

    /// Convenience constructor for mappers.
    pub fn mapping(reason: impl std::fmt::Display) -> Self {
        StateError::Mapping(reason.to_string())
    }

    /// Returns true if retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StateError::Fetch(_) | StateError::StorageUnavailable(_))
    }
}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StateError::fetch("timed out");
        assert_eq!(err.to_string(), "fetch failed: timed out");

        let err = StateError::InvalidKey("".to_string());
        assert!(err.to_string().contains("invalid key"));
    }

    #[test]
    fn test_retryable_errors() {
        assert!(StateError::fetch("offline").is_retryable());
        assert!(StateError::StorageUnavailable("locked".to_string()).is_retryable());
        assert!(!StateError::mapping("bad payload").is_retryable());
        assert!(!StateError::Panicked("boom".to_string()).is_retryable());
        assert!(!StateError::Serialization("eof".to_string()).is_retryable());
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<bool>("not json").unwrap_err();
        let err: StateError = err.into();
        assert!(matches!(err, StateError::Serialization(_)));
    }
}
