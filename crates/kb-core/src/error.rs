//! Error types for the kb pipeline

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`], used by callers that need to
/// decide whether to retry, report to the user, or treat a document as dirty.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied something unusable; retrying will not help.
    Input,
    /// The embedding provider failed.
    Provider,
    /// The vector store failed.
    Store,
    /// A document was left partially indexed.
    PartialIndex,
    /// A network call did not finish within its deadline.
    Timeout,
    /// Configuration, serialization, IO and anything else.
    Internal,
}

/// Core error types for the kb pipeline
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Embedding provider error: {0}")]
    EmbeddingProvider(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Partial index of {document}: {inserted}/{total} records inserted before failure: {reason}")]
    PartialIndex {
        document: String,
        inserted: usize,
        total: usize,
        reason: String,
    },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(String),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_)
            | Error::NotFound(_)
            | Error::DimensionMismatch { .. }
            | Error::EmptyInput(_) => ErrorKind::Input,
            Error::Authentication(_) | Error::EmbeddingProvider(_) => ErrorKind::Provider,
            Error::VectorStore(_) => ErrorKind::Store,
            Error::PartialIndex { .. } => ErrorKind::PartialIndex,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Configuration(_)
            | Error::Network(_)
            | Error::Serialization(_)
            | Error::Io(_)
            | Error::Other(_) => ErrorKind::Internal,
        }
    }

    /// Whether repeating the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::EmbeddingProvider(_)
                | Error::VectorStore(_)
                | Error::Timeout(_)
                | Error::Network(_)
        )
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Error::Timeout("operation deadline elapsed".to_string())
    }
}
