//! Dispatcher error types.

use thiserror::Error;

use super::sink::SinkError;
use crate::db::StoreError;
use crate::game::{GameError, TemplateKey};

/// Errors raised while handling one update
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The payload matches no command or callback
    #[error("No route for {0:?}")]
    RouteNotFound(String),

    /// A reply template is missing from the loaded set
    #[error("Reply template {0} not found")]
    TemplateNotFound(TemplateKey),

    /// The template file could not be read or parsed
    #[error("Invalid reply templates: {0}")]
    Templates(String),

    /// A callback arrived without an author
    #[error("Update {0} has no sender")]
    MissingSender(i64),

    #[error(transparent)]
    Game(#[from] GameError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sink(#[from] SinkError),
}

impl DispatchError {
    /// Whether the error reports a missing row, route or template
    pub fn is_not_found(&self) -> bool {
        match self {
            DispatchError::RouteNotFound(_) | DispatchError::TemplateNotFound(_) => true,
            DispatchError::Store(err) | DispatchError::Game(GameError::Store(err)) => {
                err.is_not_found()
            }
            _ => false,
        }
    }

    /// Label used in metrics
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::RouteNotFound(_) => "route_not_found",
            DispatchError::TemplateNotFound(_) => "template_not_found",
            DispatchError::Templates(_) => "templates",
            DispatchError::MissingSender(_) => "missing_sender",
            DispatchError::Game(_) => "game",
            DispatchError::Store(_) => "store",
            DispatchError::Sink(_) => "sink",
        }
    }
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;
