//! Error types for the chat history store and its drivers

use std::time::Duration;
use thiserror::Error;

/// Result type alias for store and driver operations
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Error, Debug)]
pub enum ChatError {
    /// Rejected before any I/O was attempted.
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the remote message store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP transport failure: {0}")]
    Http(reqwest::Error),

    #[error("database failure: {0}")]
    Database(#[from] sqlx::Error),

    #[error("remote store returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid row: {0}")]
    InvalidRow(String),
}

impl StorageError {
    /// Classify a reqwest failure, keeping timeouts distinct.
    pub fn from_http(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            StorageError::Timeout(timeout)
        } else {
            StorageError::Http(err)
        }
    }
}

impl ChatError {
    pub fn validation(message: impl Into<String>) -> Self {
        ChatError::Validation(message.into())
    }

    pub fn inference(message: impl Into<String>) -> Self {
        ChatError::Inference(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        ChatError::Config(message.into())
    }
}
