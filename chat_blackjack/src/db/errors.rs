//! Session store error types.

use std::time::Duration;
use thiserror::Error;

use crate::game::models::{ChatId, TgId};

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No session exists for the chat
    #[error("Session not found for chat {0}")]
    SessionNotFound(ChatId),

    /// No player matches the lookup key
    #[error("Player not found: {0}")]
    PlayerNotFound(String),

    /// The user never joined the chat's session
    #[error("Participant not found for user {tg_id} in chat {chat_id}")]
    ParticipantNotFound { tg_id: TgId, chat_id: ChatId },

    /// A row disappeared between read and write
    #[error("Row {table}#{id} vanished")]
    RowVanished { table: &'static str, id: i64 },

    /// Waiting for a row lock or query exceeded its deadline
    #[error("Store operation timed out after {0:?}")]
    Timeout(Duration),

    /// A player row was locked after a row with a higher id
    #[error("Player row {requested} locked after row {held}")]
    LockOrder { held: i64, requested: i64 },

    /// Amount must be positive, and balances must stay within range
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// A stored value could not be decoded
    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl StoreError {
    /// Whether the error reports a missing row
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::SessionNotFound(_)
                | StoreError::PlayerNotFound(_)
                | StoreError::ParticipantNotFound { .. }
                | StoreError::RowVanished { .. }
        )
    }

    /// Get a client-safe error message that doesn't leak internals
    pub fn client_message(&self) -> String {
        match self {
            StoreError::Database(_)
            | StoreError::Encoding(_)
            | StoreError::Timeout(_)
            | StoreError::LockOrder { .. } => "Internal server error".to_string(),
            StoreError::PlayerNotFound(_) => "Player not found".to_string(),
            _ => self.to_string(),
        }
    }
}

impl From<crate::game::models::UnknownStatus> for StoreError {
    fn from(err: crate::game::models::UnknownStatus) -> Self {
        StoreError::Encoding(err.to_string())
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_classification() {
        assert!(StoreError::SessionNotFound(-100).is_not_found());
        assert!(
            StoreError::ParticipantNotFound {
                tg_id: 1,
                chat_id: -100
            }
            .is_not_found()
        );
        assert!(!StoreError::InvalidAmount(0).is_not_found());
    }

    #[test]
    fn test_client_message_hides_database_details() {
        let err = StoreError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(err.client_message(), "Internal server error");

        let err = StoreError::PlayerNotFound("alice".to_string());
        assert_eq!(err.client_message(), "Player not found");
    }
}
