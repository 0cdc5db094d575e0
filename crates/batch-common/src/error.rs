//! Error types and result handling for the batch worker.

use thiserror::Error;

/// Result type alias for batch-worker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type shared across the workspace.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("shared store error: {0}")]
    Store(String),

    #[error("series codec error: {0}")]
    Codec(String),

    #[error("ensemble error: {0}")]
    Ensemble(#[from] crate::types::EnsembleFailure),

    #[error("anomaly router error: {0}")]
    Router(String),

    #[error("feature extraction error: {0}")]
    Features(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl Error {
    /// Whether a failure on this path is expected to be transient and
    /// worth a reconnect/backoff cycle at the Supervisor level.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Store(_))
    }

    pub fn category(&self) -> &'static str {
        match self {
            Error::Configuration(_) => "configuration",
            Error::Store(_) => "store",
            Error::Codec(_) => "codec",
            Error::Ensemble(_) => "ensemble",
            Error::Router(_) => "router",
            Error::Features(_) => "features",
            Error::Io(_) => "io",
            Error::Serialization(_) => "serialization",
            Error::Generic(_) => "generic",
        }
    }
}
