//! Error types shared across the claims pipeline

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, QdError>;

/// Main error type for the QD3176 pipeline
#[derive(Error, Debug)]
pub enum QdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(String),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Claim envelope is missing element: {0}")]
    MissingElement(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl QdError {
    /// True when the error was caused by client input and a retry
    /// would deterministically fail again.
    pub fn is_client_input(&self) -> bool {
        matches!(
            self,
            QdError::Xml(_) | QdError::Base64(_) | QdError::MissingElement(_)
        )
    }
}
