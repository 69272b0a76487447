//! Notifier error types.

use thiserror::Error;

/// Persistence failures.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Liveness source failures.
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The source could not be reached at all.
    #[error("Connection error: {0}")]
    Connectivity(String),

    /// Transient upstream outage; the query is skipped for this cycle.
    #[error("Source unavailable (HTTP {0})")]
    Unavailable(u16),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SourceError {
    pub(crate) fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            SourceError::Connectivity(e.to_string())
        } else {
            SourceError::Http(e)
        }
    }
}

/// A poll cycle that had to stop early.
#[derive(Error, Debug)]
pub enum PollError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PollError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, PollError::Source(SourceError::Connectivity(_)))
    }
}
