//! Concurrent chunked object transfer with progress tracking and
//! end-to-end MD5 verification.
//!
//! A [`TransferJob`] plans the byte ranges of one object, the
//! [`TransferEngine`] moves them through a bounded worker pool, and a
//! [`ProgressReporter`] samples the job's counters on its own timer.

mod checksum;
mod chunked;
mod engine;
mod layout;
mod progress;
mod remote;
mod types;

use std::future::Future;
use std::pin::Pin;

use cloudctl_protocol::{ErrorKind, ObjectKind};

pub use checksum::{ChecksumStatus, content_md5, file_md5, verify_checksum};
pub use chunked::{ChunkDescriptor, LocalFile, plan_chunks};
pub use engine::{TransferEngine, TransferOutcome};
pub use layout::{ChunkLayout, PAGE_ALIGNMENT};
pub use progress::{
    ProgressCallback, ProgressHandle, ProgressReporter, SpeedCalculator, SpeedSample,
    SpeedSummary,
};
pub use remote::{ChunkWrite, ObjectCommit, RemoteObject};
pub use types::{Concurrency, Direction, TransferJob, TransferState};

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 4 * 1024 * 1024;

/// Boxed future returned by [`RemoteObject`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: stored {expected}, computed {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("type mismatch: {name} is a {actual}, transfer expects a {expected}")]
    TypeMismatch {
        name: String,
        expected: ObjectKind,
        actual: ObjectKind,
    },

    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid transfer option: {0}")]
    Validation(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("cancelled")]
    Cancelled,
}

impl TransferError {
    /// Category of this error for the command layer.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Transport(_) | Self::Worker(_) => ErrorKind::Transport,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }
}
