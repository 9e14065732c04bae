//! Error types for wxreader
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for wxreader operations
///
/// This enum covers configuration loading, article lookup, calls to the
/// chat/OCR API, the OCR cache, and chat session state checks.
#[derive(Error, Debug)]
pub enum ReaderError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// No API key has been configured for the chat/OCR endpoint
    #[error("API Key is missing")]
    MissingApiKey,

    /// The chat/OCR API answered with a non-success status
    #[error("{message}")]
    Api {
        /// HTTP status code returned by the API
        status: u16,
        /// Human readable message extracted from the response body
        message: String,
    },

    /// A streamed reply went quiet for longer than the idle timeout
    #[error("No data received for {0} seconds, the reply stream stalled")]
    StreamStalled(u64),

    /// Article lookup failed
    #[error("Article not found: {0}")]
    ArticleNotFound(String),

    /// Operation rejected by the chat session in its current state
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// OCR cache errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for wxreader operations
///
/// Uses `anyhow::Error` so callers can attach context while still being
/// able to downcast to [`ReaderError`].
pub type Result<T> = anyhow::Result<T>;
