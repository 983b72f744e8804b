//! Custom error types for query-collapse

use crate::processor::Phase;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for query-collapse operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("UUID parse error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Dataset worker pool closed")]
    PoolClosed,

    #[error("Already initialized at {0}")]
    AlreadyInitialized(String),

    #[error("Dataset {dataset_id} failed while {phase}: {source}")]
    Dataset {
        dataset_id: Uuid,
        phase: Phase,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Attach dataset and phase context to a failure
    pub fn dataset(dataset_id: Uuid, phase: Phase, source: Error) -> Self {
        Error::Dataset {
            dataset_id,
            phase,
            source: Box::new(source),
        }
    }

    /// Phase a per-dataset failure happened in, if any
    pub fn phase(&self) -> Option<Phase> {
        match self {
            Error::Dataset { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

/// Result type alias for query-collapse
pub type Result<T> = std::result::Result<T, Error>;
