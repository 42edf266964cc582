//! Error types for cache and persistence operations
//!
//! Persistence errors are deliberately low-severity: the cache layer catches
//! and logs them at its boundary, so callers of the in-memory operations
//! never see a persistence failure.

use thiserror::Error;

/// Main error type for cache operations
#[derive(Error, Debug)]
pub enum CacheError {
    /// Persistence store read/write error
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key encoding/decoding error
    #[error("Key codec error: {0}")]
    Codec(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

impl From<String> for CacheError {
    fn from(s: String) -> Self {
        CacheError::Other(s)
    }
}

impl From<&str> for CacheError {
    fn from(s: &str) -> Self {
        CacheError::Other(s.to_string())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(e: std::io::Error) -> Self {
        CacheError::Persistence(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CacheError::Persistence("write refused".to_string());
        assert_eq!(error.to_string(), "Persistence error: write refused");

        let error = CacheError::Codec("stray marker".to_string());
        assert!(error.to_string().contains("stray marker"));
    }

    #[test]
    fn test_error_conversion() {
        let error: CacheError = "test error".into();
        assert!(matches!(error, CacheError::Other(_)));

        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let error: CacheError = io.into();
        assert!(matches!(error, CacheError::Persistence(_)));
    }
}
