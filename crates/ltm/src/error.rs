//! Error types for the ltm engine

use thiserror::Error;

/// Main error type for ltm operations
#[derive(Error, Debug)]
pub enum LtmError {
    /// A PROJECT-region memory or curiosity item was requested without a project
    #[error("Invalid region: PROJECT region requires a project")]
    InvalidRegion,

    /// The caller-declared project disagrees with the project resolved from cwd
    #[error("Project mismatch: declared '{declared}' but current project is '{resolved}'")]
    ProjectMismatch { declared: String, resolved: String },

    /// Caller input that cannot be acted on (empty text, bad budget)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unknown id, or a memory that can no longer be acted on
    #[error("Not found: {0}")]
    NotFound(String),

    /// An id prefix matched more than one row
    #[error("Ambiguous id '{prefix}' matches: {}", candidates.join(", "))]
    AmbiguousId {
        prefix: String,
        candidates: Vec<String>,
    },

    /// Signature verification failed (flagged on results, never fatal)
    #[error("Signature invalid for memory {0}")]
    SignatureInvalid(String),

    /// No embedding backend could be used (falls back to keyword search)
    #[error("Embedding unavailable: {0}")]
    EmbeddingUnavailable(String),

    /// Database or integrity failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// A configured memory cap would be exceeded
    #[error("Memory limit exceeded for {scope}: {current}/{limit}")]
    LimitExceeded {
        scope: String,
        current: usize,
        limit: usize,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<rusqlite::Error> for LtmError {
    fn from(e: rusqlite::Error) -> Self {
        LtmError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for LtmError {
    fn from(e: serde_json::Error) -> Self {
        LtmError::Serialization(e.to_string())
    }
}

/// Result type alias for ltm operations
pub type Result<T> = std::result::Result<T, LtmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ambiguous_id_lists_candidates() {
        let err = LtmError::AmbiguousId {
            prefix: "ab".to_string(),
            candidates: vec!["abc1".to_string(), "abd2".to_string()],
        };
        assert_eq!(err.to_string(), "Ambiguous id 'ab' matches: abc1, abd2");
    }

    #[test]
    fn test_rusqlite_error_maps_to_storage() {
        let err: LtmError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, LtmError::Storage(_)));
    }
}
