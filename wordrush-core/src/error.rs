use crate::ledger::LedgerError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, GameError>;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("Invalid guess: {0}")]
    Validation(String),

    #[error("Invalid game state: {0}")]
    InvalidState(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GameError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn precondition(msg: impl Into<String>) -> Self {
        Self::PreconditionFailed(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Short message suitable for showing next to the last known game state.
    pub fn user_message(&self) -> String {
        match self {
            GameError::Network(_) => "Network unavailable, showing last known state".to_string(),
            GameError::RateLimited(_) => "Too many requests, try again shortly".to_string(),
            GameError::PreconditionFailed(msg) => msg.clone(),
            GameError::BroadcastRejected(reason) => format!("Transaction rejected: {}", reason),
            GameError::Validation(msg) => msg.clone(),
            GameError::InvalidState(msg) => msg.clone(),
            GameError::Decode(_) => "Unexpected response from the ledger".to_string(),
            GameError::Storage(_) | GameError::Serialization(_) => {
                "Local storage unavailable".to_string()
            }
            GameError::Config(msg) => format!("Configuration error: {}", msg),
            GameError::Internal(msg) => msg.clone(),
        }
    }
}

impl From<LedgerError> for GameError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::RateLimited(msg) => GameError::RateLimited(msg),
            LedgerError::Network(msg) => GameError::Network(msg),
            LedgerError::Decode(msg) => GameError::Decode(msg),
            LedgerError::Contract { function, code } => {
                GameError::BroadcastRejected(format!("{} failed with (err u{})", function, code))
            }
        }
    }
}
