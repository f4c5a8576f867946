//! Error taxonomy
//!
//! Every module error carries a [`ErrorKind`] so the search path can classify
//! failures uniformly into `debug.errors` without matching on per-module
//! variants (see the hybrid search service).

use std::fmt;

/// Coarse error classification shared across every module, matching the
/// recovery policy described for the retrieval/learning core.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A stage missed its deadline.
    Timeout,
    /// The dependency's circuit breaker is open.
    CircuitOpen,
    /// Malformed outcome, unknown tier, bad pagination, etc.
    InvalidInput,
    /// Memory id, document, or known solution absent.
    NotFound,
    /// Duplicate unique key on upsert.
    Conflict,
    /// Network or backend failure below the timeout threshold.
    TransientStoreError,
    /// Unexpected payload shape from reranker or summariser.
    SerializationError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::TransientStoreError => "transient_store_error",
            ErrorKind::SerializationError => "serialization_error",
        };
        write!(f, "{s}")
    }
}

/// Error returned by the document store adapter.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("conflict on unique key: {0}")]
    Conflict(String),
    #[error("initialization error: {0}")]
    Init(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::Database(_) | StorageError::Io(_) => ErrorKind::TransientStoreError,
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::InvalidInput(_) => ErrorKind::InvalidInput,
            StorageError::Conflict(_) => ErrorKind::Conflict,
            StorageError::Init(_) => ErrorKind::TransientStoreError,
            StorageError::Serialization(_) => ErrorKind::SerializationError,
        }
    }
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Error returned by the hybrid search pipeline's internal stages. The
/// service itself never returns this to callers (the search path is
/// fail-open) but uses it to populate `debug.errors`.
#[non_exhaustive]
#[derive(Debug, thiserror::Error, Clone)]
pub enum SearchStageError {
    #[error("{stage} timed out")]
    Timeout { stage: String },
    #[error("{stage} circuit open")]
    CircuitOpen { stage: String },
    #[error("{stage} failed: {message}")]
    Transient { stage: String, message: String },
    #[error("{stage} returned an unexpected payload: {message}")]
    Serialization { stage: String, message: String },
}

impl SearchStageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SearchStageError::Timeout { .. } => ErrorKind::Timeout,
            SearchStageError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            SearchStageError::Transient { .. } => ErrorKind::TransientStoreError,
            SearchStageError::Serialization { .. } => ErrorKind::SerializationError,
        }
    }

    pub fn stage(&self) -> &str {
        match self {
            SearchStageError::Timeout { stage }
            | SearchStageError::CircuitOpen { stage }
            | SearchStageError::Transient { stage, .. }
            | SearchStageError::Serialization { stage, .. } => stage,
        }
    }
}

/// Error returned by outcome recording.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error("invalid outcome kind: {0}")]
    InvalidOutcome(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl OutcomeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OutcomeError::InvalidOutcome(_) => ErrorKind::InvalidInput,
            OutcomeError::Storage(e) => e.kind(),
        }
    }
}

/// Error returned by the document registry.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("parse failed: {0}")]
    Parse(String),
}

impl RegistryError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Storage(e) => e.kind(),
            RegistryError::Fetch(_) | RegistryError::Parse(_) => ErrorKind::TransientStoreError,
        }
    }
}
