//! Error types for the course engine.

use thiserror::Error;

/// Errors raised at a storage boundary (graph source, progress store,
/// published catalog).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    /// Persisted data exists but cannot be decoded. Distinct from "empty".
    #[error("Corrupt {what}: {reason}")]
    Corrupt { what: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Optimistic concurrency check failed on write.
    #[error("Version conflict on {id}: expected {expected:?}, found {found:?}")]
    Conflict {
        id: String,
        expected: Option<u32>,
        found: Option<u32>,
    },

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    /// Build a [`StorageError::Corrupt`] from any displayable cause.
    pub fn corrupt(what: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Corrupt {
            what: what.into(),
            reason: reason.to_string(),
        }
    }

    /// Whether this error is an optimistic-concurrency conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Authoring mistakes rejected by the course tree model.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("A node cannot link to itself: {0}")]
    SelfLoop(String),

    #[error("No node bound to concept {0}")]
    UnknownNode(String),

    #[error("Concept {0} is already bound to another node")]
    DuplicateConcept(String),

    #[error("Node position {0} is out of range")]
    PositionOutOfRange(usize),
}

/// Errors returned by publish/unpublish.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The tree failed validation; messages are the validation report.
    #[error("Tree failed validation: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_corrupt_display() {
        let err = StorageError::corrupt("progress for u1", "expected value at line 1");
        assert_eq!(
            err.to_string(),
            "Corrupt progress for u1: expected value at line 1"
        );
        assert!(!err.is_conflict());
    }

    #[test]
    fn test_publish_invalid_joins_messages() {
        let err = PublishError::Invalid(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Tree failed validation: a; b");
    }
}
