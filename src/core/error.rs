use thiserror::Error;

use crate::core::types::Stage;

#[derive(Error, Debug)]
pub enum GameError {
    #[error("{operation} is not available during the {stage} stage")]
    WrongStage {
        operation: &'static str,
        stage: Stage,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("No content available: {0}")]
    NoContentAvailable(String),

    #[error("{operation} unavailable: {reason}")]
    PersistenceUnavailable {
        operation: &'static str,
        reason: String,
    },

    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl GameError {
    pub fn unavailable(operation: &'static str, reason: impl ToString) -> Self {
        GameError::PersistenceUnavailable {
            operation,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GameError>;
