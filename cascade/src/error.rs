//! Error types for the cascade engine
//!
//! Two failure families matter here: generation failures, which the
//! coordinator surfaces to its caller after rolling the node back, and
//! structural violations, which indicate a caller bug and fail fast.
//! Persistence failures never appear in this enum; they are swallowed
//! and logged inside the cache layer.

use cascade_cache::CacheError;
use thiserror::Error;

/// Main error type for cascade operations
#[derive(Error, Debug)]
pub enum CascadeError {
    /// The content generator exhausted its retry budget
    #[error("Generation failed after {attempts} attempts: {message}")]
    Generation { attempts: u32, message: String },

    /// Caller bug: an operation referenced a node that does not exist or
    /// is in a state the operation forbids
    #[error("Structural violation: {0}")]
    Structural(String),

    /// Cache layer error
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Result type alias for cascade operations
pub type Result<T> = std::result::Result<T, CascadeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = CascadeError::Generation {
            attempts: 3,
            message: "timeout".to_string(),
        };
        assert!(error.to_string().contains("3 attempts"));

        let error = CascadeError::Structural("unknown parent".to_string());
        assert!(error.to_string().contains("unknown parent"));
    }
}
