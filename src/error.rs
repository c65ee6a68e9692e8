//! Error types for the progression engine

use crate::challenge::ChallengeStatus;
use thiserror::Error;
use uuid::Uuid;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Illegal lifecycle transition
    #[error("Challenge {instance} is {current}, operation requires {required}")]
    StateConflict {
        instance: Uuid,
        current: ChallengeStatus,
        required: ChallengeStatus,
    },

    /// Single-active-instance rule violated on accept
    #[error("User {user} already has an active challenge ({active})")]
    AlreadyActive { user: String, active: Uuid },

    /// Too many concurrent available/active challenges
    #[error("User {user} already holds {limit} open challenges")]
    Capacity { user: String, limit: usize },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl EngineError {
    /// True for the errors a caller may resolve by re-reading state.
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            EngineError::StateConflict { .. } | EngineError::AlreadyActive { .. }
        )
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Corrupt row: {0}")]
    Corrupt(String),
}
