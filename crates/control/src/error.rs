//! Control-plane error types.

use cloudctl_protocol::{ErrorKind, RemoteError, TransitionError};
use cloudctl_transfer::TransferError;

/// Errors produced by control-plane operations.
#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("operation failed with HTTP {status}: {error}")]
    OperationFailed { status: u16, error: RemoteError },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("cancelled")]
    Cancelled,

    #[error("operation still running after {attempts} status checks")]
    Timeout { attempts: u32 },

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),
}

impl ControlError {
    /// Maps a rejected submission to an error.
    ///
    /// The body's `Message` (or `Error.Message`) is used as detail when
    /// present, otherwise the raw body.
    pub fn from_status(status: u16, body: &serde_json::Value) -> Self {
        let detail = body_message(body).unwrap_or_else(|| {
            if body.is_null() {
                format!("HTTP {status}")
            } else {
                format!("HTTP {status}: {body}")
            }
        });

        match ErrorKind::from_http_status(status) {
            ErrorKind::NotFound => Self::NotFound(detail),
            ErrorKind::AlreadyExists => Self::AlreadyExists(detail),
            ErrorKind::Validation => Self::Validation(detail),
            _ => Self::Transport(detail),
        }
    }

    /// Category of this error for the command layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Self::OperationFailed { .. } => ErrorKind::OperationFailed,
            Self::Validation(_) | Self::Json(_) | Self::Transition(_) => ErrorKind::Validation,
            Self::Transport(_) | Self::Io(_) => ErrorKind::Transport,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Transfer(e) => e.kind(),
        }
    }
}

fn body_message(body: &serde_json::Value) -> Option<String> {
    let message = body
        .get("Message")
        .or_else(|| body.get("Error").and_then(|e| e.get("Message")))?;
    message.as_str().map(str::to_string)
}
