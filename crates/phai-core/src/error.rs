use core::result::Result as CoreResult;
use std::io::Error as IoError;

use reqwest::Error as ReqwestError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;
use toml::de::Error as TomlError;

/// Result type for engine operations.
pub type Result<T> = CoreResult<T, Error>;

/// Errors that can occur while indexing or searching media.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// An HTTP request to the embedding service failed.
    #[error("HTTP request failed: {0}")]
    Request(#[from] ReqwestError),

    /// JSON serialization or deserialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] SerdeJsonError),

    /// TOML deserialization failed.
    #[error("TOML deserialization error: {0}")]
    Toml(#[from] TomlError),

    /// Configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The embedding provider failed to produce a vector for one input.
    #[error("Provider error: {0}")]
    Provider(String),

    /// The embedding provider cannot be reached or has no model loaded.
    #[error("Embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// An image, video or frame could not be decoded.
    #[error("Decode error: {0}")]
    Decode(String),

    /// An embedding does not match the dimension of the index.
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension fixed by the index
        expected: usize,
        /// Dimension of the rejected vector
        actual: usize,
    },

    /// The persisted index cannot be read back.
    #[error("Index store corrupt: {0}")]
    StoreCorrupt(String),

    /// The query was rejected before any work started.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The directory to index does not exist.
    #[error("Root directory not found: {0}")]
    RootNotFound(String),

    /// No job with this identifier is known to the controller.
    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The job has not reached a terminal state yet.
    #[error("Job still running: {0}")]
    JobRunning(String),

    /// The operation observed a stop request and ended early.
    #[error("Operation cancelled")]
    Cancelled,

    /// A job ended in the failed state.
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// A general error not covered by other variants.
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error only affects a single media item.
    ///
    /// Item-level errors are logged and counted as skipped; every other error
    /// ends the running job.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            Self::Io(_)
                | Self::Request(_)
                | Self::Provider(_)
                | Self::Decode(_)
                | Self::DimensionMismatch { .. }
        )
    }
}
