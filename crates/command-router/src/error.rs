//! Command routing errors.

use std::time::Duration;
use thiserror::Error;

/// Failure to map text onto a command.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No prefix matched")]
    NoPrefixMatch,

    #[error("Empty command")]
    Empty,

    #[error("Command \"{0}\" is not found")]
    CommandNotFound(String),

    #[error("Command \"{group}\" has no subcommand \"{name}\"")]
    NoSuchSubcommand { group: String, name: String },
}

/// Malformed or missing command arguments.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    #[error("Missing argument: {0}")]
    Missing(String),

    #[error("Invalid value for {param}: {value}")]
    BadType { param: String, value: String },

    #[error("Expected closing quote")]
    UnclosedQuote,
}

/// Tree mutation failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("\"{name}\" is already registered under {parent}")]
    DuplicateName { name: String, parent: String },

    #[error("No command at path \"{0}\"")]
    UnknownPath(String),

    #[error("\"{0}\" is not a group")]
    NotAGroup(String),

    #[error("\"{0}\" is not an alias")]
    NotAnAlias(String),

    #[error("Attaching \"{0}\" there would create a cycle")]
    Cycle(String),

    #[error("Invalid signature for \"{0}\": consume-rest parameter must be last")]
    InvalidSignature(String),
}

/// Failure raised by a command handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Shown to the user verbatim.
    #[error("{0}")]
    User(String),

    #[error("Execution exceeded time limit of {0:?}")]
    Timeout(Duration),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn user(message: impl Into<String>) -> Self {
        HandlerError::User(message.into())
    }

    pub fn upstream(error: impl std::fmt::Display) -> Self {
        HandlerError::Upstream(error.to_string())
    }
}

/// Everything the dispatcher can report for one command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error(transparent)]
    Resolution(#[from] ResolveError),

    #[error(transparent)]
    Argument(#[from] ArgumentError),

    #[error("Check failed for {0}")]
    Forbidden(String),

    #[error(transparent)]
    Handler(HandlerError),

    #[error("Execution exceeded time limit of {0:?}")]
    Timeout(Duration),
}

impl From<HandlerError> for CommandError {
    fn from(e: HandlerError) -> Self {
        match e {
            HandlerError::Timeout(limit) => CommandError::Timeout(limit),
            other => CommandError::Handler(other),
        }
    }
}

impl CommandError {
    /// Reply text for the user, or `None` when the error stays silent.
    pub fn user_message(&self) -> Option<String> {
        match self {
            CommandError::Resolution(ResolveError::NoSuchSubcommand { group, name }) => Some(
                format!(":no_entry: `{}` has no subcommand `{}`", group, name),
            ),
            CommandError::Resolution(_) => None,
            CommandError::Argument(ArgumentError::Missing(param)) => {
                Some(format!(":no_entry: Missing argument: `{}`", param))
            }
            CommandError::Argument(ArgumentError::BadType { param, value }) => Some(format!(
                ":no_entry: Invalid value for `{}`: `{}`",
                param, value
            )),
            CommandError::Argument(ArgumentError::UnclosedQuote) => {
                Some(":no_entry: Expected a closing quote".into())
            }
            CommandError::Forbidden(_) => {
                Some(":no_entry: You don't have permission to use that command here".into())
            }
            CommandError::Handler(HandlerError::User(message)) => {
                Some(format!(":no_entry: {}", message))
            }
            CommandError::Handler(_) => Some(":no_entry: Error".into()),
            CommandError::Timeout(_) => Some(":no_entry: Execution exceeded time limit".into()),
        }
    }
}
