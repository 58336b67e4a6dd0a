//! Application error types.
//!
//! All errors use `thiserror` for automatic Error trait derivation. Every
//! variant maps onto one of the closed [`ErrorKind`]s, which is what the
//! dispatch engine uses to pick a recovery message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Closed set of error kinds understood by the dispatch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Intent request received with no matching registered handler.
    NoIntentFound,
    /// Launch request received with no launch handler registered.
    NoLaunchFunction,
    /// Request category unrecognized and not a media-player event.
    InvalidRequestType,
    /// Session operation attempted when the request carried no session.
    NoSessionAvailable,
    /// Anything raised by a handler or hook body.
    UnhandledException,
}

impl ErrorKind {
    /// Wire tag, matching the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NoIntentFound => "NO_INTENT_FOUND",
            ErrorKind::NoLaunchFunction => "NO_LAUNCH_FUNCTION",
            ErrorKind::InvalidRequestType => "INVALID_REQUEST_TYPE",
            ErrorKind::NoSessionAvailable => "NO_SESSION_AVAILABLE",
            ErrorKind::UnhandledException => "UNHANDLED_EXCEPTION",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error enum for skill dispatch.
#[derive(Error, Debug)]
pub enum Error {
    /// No handler registered for the named intent.
    #[error("no intent found: {0}")]
    NoIntentFound(String),

    /// Launch request without a launch handler.
    #[error("no launch function registered")]
    NoLaunchFunction,

    /// Unrecognized request category (`None` when the body had no type).
    #[error("invalid request type: {}", .0.as_deref().unwrap_or("<missing>"))]
    InvalidRequestType(Option<String>),

    /// Session access on a request that carried no session.
    #[error("no session available")]
    NoSessionAvailable,

    /// Error returned by handler code.
    #[error("{0}")]
    Handler(String),

    /// Panic captured while running handler or hook code.
    #[error("panic in {operation}: {message}")]
    Panicked { operation: String, message: String },

    /// Invalid registration or configuration.
    #[error("validation error: {0}")]
    Validation(String),

    /// Serialization/deserialization errors.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map onto the closed kind set used for recovery.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NoIntentFound(_) => ErrorKind::NoIntentFound,
            Error::NoLaunchFunction => ErrorKind::NoLaunchFunction,
            Error::InvalidRequestType(_) => ErrorKind::InvalidRequestType,
            Error::NoSessionAvailable => ErrorKind::NoSessionAvailable,
            Error::Handler(_)
            | Error::Panicked { .. }
            | Error::Validation(_)
            | Error::Serialization(_)
            | Error::Io(_) => ErrorKind::UnhandledException,
        }
    }
}

// Convenience constructors
impl Error {
    pub fn handler(msg: impl Into<String>) -> Self {
        Self::Handler(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn panicked(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Panicked {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Failure reason delivered by a rejected dispatch.
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct Rejection {
    /// Human-readable reason handed to the transport layer.
    pub reason: String,

    /// Error that caused the rejection, if any.
    #[source]
    pub cause: Option<Error>,
}

impl Rejection {
    pub fn new(reason: impl Into<String>, cause: Option<Error>) -> Self {
        Self {
            reason: reason.into(),
            cause,
        }
    }

    /// Every handle able to finish the turn was dropped while it was pending.
    pub fn abandoned() -> Self {
        Self::new("Turn abandoned before completion", None)
    }

    /// Kind of the underlying cause.
    pub fn kind(&self) -> Option<ErrorKind> {
        self.cause.as_ref().map(Error::kind)
    }
}
