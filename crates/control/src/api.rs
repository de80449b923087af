//! Management API seam used by the poller.

use cloudctl_transfer::BoxFuture;

use crate::error::ControlError;

/// Status lookup for accepted long-running operations.
///
/// Implemented by the command layer on top of its HTTP client; tests use
/// scripted mocks.
pub trait OperationApi: Send + Sync {
    /// Fetches the raw status body of the operation `request_id`.
    fn operation_status(
        &self,
        request_id: &str,
    ) -> BoxFuture<'_, Result<serde_json::Value, ControlError>>;
}
