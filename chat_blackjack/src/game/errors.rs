//! Game error types.

use thiserror::Error;

use crate::db::StoreError;

/// Errors raised by the session state machine
#[derive(Debug, Error)]
pub enum GameError {
    /// Storage failure or missing row
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The event doesn't apply in the current state; nothing changed
    #[error("Invalid transition: {0}")]
    InvalidTransition(&'static str),

    /// Nobody is left to take a turn; the round goes to settlement
    #[error("No active participants left")]
    NoActiveParticipants,
}

impl GameError {
    /// Whether the error is an ignorable precondition mismatch
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, GameError::InvalidTransition(_))
    }
}

/// Result type for game operations
pub type GameResult<T> = Result<T, GameError>;
