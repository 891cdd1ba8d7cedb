//! Error types for the evaluation harness.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Coarse classification of an [`EvalError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Precondition violated at a pure-function boundary.
    InvalidInput,
    /// Model output lacks the structure needed to extract an answer.
    MalformedGeneration,
    /// Stored progress state is unreadable or breaks its invariant.
    CorruptCheckpoint,
    /// Persisted state could not be read or written.
    StorageFailure,
    /// The model collaborator failed.
    Model,
    /// Configuration or input files are unusable.
    Setup,
}

/// Errors that can occur in the evaluation harness.
#[derive(Error, Debug)]
pub enum EvalError {
    /// A caller broke a precondition, e.g. an empty candidate list.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The decoded generation has no answer section.
    #[error("Malformed generation: {0}")]
    MalformedGeneration(String),

    /// A checkpoint record exists but cannot be trusted.
    #[error("Corrupt checkpoint at '{path}': {reason}")]
    CorruptCheckpoint { path: PathBuf, reason: String },

    /// Error reading or writing persisted state.
    #[error("Storage error for path '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Dataset or manifest could not be loaded.
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Model API error.
    #[error("Model error: {0}")]
    Model(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// Create a storage error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Create a corrupt-checkpoint error with path context.
    pub fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::CorruptCheckpoint {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The tag callers match on to separate recoverable from fatal failures.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EvalError::InvalidInput(_) => ErrorKind::InvalidInput,
            EvalError::MalformedGeneration(_) => ErrorKind::MalformedGeneration,
            EvalError::CorruptCheckpoint { .. } => ErrorKind::CorruptCheckpoint,
            EvalError::Storage { .. } | EvalError::Serialization(_) => ErrorKind::StorageFailure,
            EvalError::Model(_) | EvalError::Http(_) => ErrorKind::Model,
            EvalError::Dataset(_) | EvalError::Config(_) => ErrorKind::Setup,
        }
    }

    /// Whether a failure while scoring one sample may be recorded and skipped.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidInput | ErrorKind::MalformedGeneration
        )
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        EvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}
