use fishing_shared::{ConnectionId, ParseDirectionError};

/// Failures surfaced by the fishing core.
///
/// `NotFound` is usually a disconnect race and is absorbed by the transport.
/// `InvalidAction` is always reported back to the requesting connection.
/// `Internal` never leaves a hook resolution task.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GameError {
    #[error("no player registered for connection {0}")]
    NotFound(ConnectionId),

    #[error("{0}")]
    InvalidAction(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GameError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        GameError::InvalidAction(reason.into())
    }
}

impl From<ParseDirectionError> for GameError {
    fn from(err: ParseDirectionError) -> Self {
        GameError::InvalidAction(format!("Cannot change direction: {}.", err))
    }
}

pub type GameResult<T> = Result<T, GameError>;
