//! Error types for the Sori core

use thiserror::Error;

/// Main error type for Sori operations
#[derive(Debug, Error)]
pub enum SoriError {
    /// Voice connection error (channel exclusivity, invalid channel, join
    /// timeout, abandoned reconnect)
    #[error("connection error: {0}")]
    Connection(String),

    /// Speech synthesis error (failed fetch, non-success response, empty body)
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Transcoder error (spawn failure, broken pipe, abnormal exit)
    #[error("transcode error: {0}")]
    Transcode(String),

    /// Validation error (out-of-range profile index, invalid enqueue)
    #[error("validation error: {0}")]
    Validation(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type using SoriError
pub type Result<T> = std::result::Result<T, SoriError>;

impl SoriError {
    /// Create a connection error
    pub fn connection(msg: impl Into<String>) -> Self {
        SoriError::Connection(msg.into())
    }

    /// Create a synthesis error
    pub fn synthesis(msg: impl Into<String>) -> Self {
        SoriError::Synthesis(msg.into())
    }

    /// Create a transcode error
    pub fn transcode(msg: impl Into<String>) -> Self {
        SoriError::Transcode(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        SoriError::Validation(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        SoriError::Config(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        SoriError::Other(msg.into())
    }
}
