//! Chat client errors.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChatError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Missing permissions: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited")]
    RateLimited,
}

impl ChatError {
    /// Whether the platform refused the operation for lack of permissions.
    pub fn is_forbidden(&self) -> bool {
        matches!(self, ChatError::Forbidden(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ChatError::NotFound(_))
    }
}
