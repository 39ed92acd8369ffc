//! Error types for LexAI
//!
//! This module defines all error types used throughout the application,
//! using `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Main error type for LexAI operations
///
/// Covers configuration loading, request validation, engine calls,
/// and conversation storage. The HTTP layer maps each variant to a
/// status code.
#[derive(Error, Debug)]
pub enum LexaiError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The requested model variant is not configured
    #[error("Unknown model variant '{0}'")]
    UnknownVariant(String),

    /// The request body failed validation
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Conversation does not exist in the log directory
    #[error("Conversation not found: {0}")]
    NotFound(String),

    /// Inference engine errors (connection, HTTP status, malformed payloads)
    #[error("Engine error: {0}")]
    Engine(String),

    /// A comparison did not finish before its deadline
    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),

    /// Conversation storage errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for LexAI operations
///
/// Uses `anyhow::Error` so call sites can attach context; typed
/// `LexaiError` values are recovered with `downcast_ref` where the
/// distinction matters (HTTP status mapping).
pub type Result<T> = anyhow::Result<T>;

/// Re-labels any failure coming out of an engine call as [`LexaiError::Engine`]
///
/// Errors that already are engine errors pass through untouched so the
/// message is not prefixed twice.
pub fn engine_failure(err: anyhow::Error) -> anyhow::Error {
    match err.downcast_ref::<LexaiError>() {
        Some(LexaiError::Engine(_)) | Some(LexaiError::Timeout(_)) => err,
        _ => LexaiError::Engine(format!("{:#}", err)).into(),
    }
}
