//! Application error types.

use command_router::HandlerError;
use thiserror::Error;

/// Main application error type.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] anyhow::Error),

    #[error("Chat error: {0}")]
    Chat(#[from] chat_client::ChatError),

    #[error("Command registry error: {0}")]
    Registry(#[from] command_router::RegistryError),

    #[error("Store error: {0}")]
    Store(#[from] stream_notifier::StoreError),

    #[error("Twitch error: {0}")]
    Twitch(#[from] stream_notifier::SourceError),

    #[error("Resource API error: {0}")]
    Resource(#[from] ResourceError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for application errors.
pub type AppResult<T> = Result<T, AppError>;

/// Failures of the third-party APIs behind resource commands.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Not found")]
    NotFound,

    /// Rejected input, with the API's explanation.
    #[error("{0}")]
    BadRequest(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },
}

impl From<ResourceError> for HandlerError {
    fn from(e: ResourceError) -> Self {
        match e {
            ResourceError::NotFound => HandlerError::user("Error"),
            ResourceError::BadRequest(message) => HandlerError::user(format!("Error: {}", message)),
            other => HandlerError::upstream(other),
        }
    }
}
