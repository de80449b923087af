use serde::{Deserialize, Serialize};

/// Failure categories surfaced to the command layer.
///
/// Each crate error maps onto one of these through its `kind()` method so
/// the caller can pick an exit code or message without matching on
/// crate-specific variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Target resource absent.
    NotFound,
    /// Conflicting create.
    AlreadyExists,
    /// Transfer against an object of an incompatible declared type.
    TypeMismatch,
    /// Post-transfer digest disagreement.
    ChecksumMismatch,
    /// Remote asynchronous operation ended in `Failed`.
    OperationFailed,
    /// Invalid caller-supplied option.
    Validation,
    /// Network or protocol failure of the underlying call.
    Transport,
    /// Stopped through a cancellation token.
    Cancelled,
    /// A configured attempt or time bound was exceeded.
    Timeout,
}

impl ErrorKind {
    /// Maps an HTTP status of a failed call onto a category.
    pub fn from_http_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            409 => Self::AlreadyExists,
            400 | 422 => Self::Validation,
            _ => Self::Transport,
        }
    }
}
