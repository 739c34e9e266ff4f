//! Error types for the Diligence engine.
//!
//! This module defines a unified error enum covering the engine's error
//! taxonomy: input validation, missing entities, indexing and retrieval
//! failures, answer generation failures, and state conflicts, plus the
//! ambient categories (LLM transport, persistence, configuration, I/O).

use thiserror::Error;

/// Unified error type for the Diligence engine.
///
/// All fallible functions return `Result<T, AppError>`.
/// We never panic; errors must be represented and propagated.
#[derive(Error, Debug)]
pub enum AppError {
    /// Malformed input (e.g. empty manual answer on a MANUAL transition)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown document/project/question/answer id
    #[error("Not found: {0}")]
    NotFound(String),

    /// Chunk or embedding insertion failure while indexing a document
    #[error("Indexing error: {0}")]
    Indexing(String),

    /// Scoped search over documents none of which are indexed
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Both candidates absent, or merge output unparsable
    #[error("Generation error: {0}")]
    Generation(String),

    /// Illegal state transition or concurrent-operation collision
    #[error("Conflict: {0}")]
    Conflict(String),

    /// LLM provider errors (timeouts, rate limits, transport failures)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Relational store errors
    #[error("Store error: {0}")]
    Store(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O and filesystem errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for AppError {
    fn from(err: serde_yaml::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;
