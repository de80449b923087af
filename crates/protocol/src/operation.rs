//! Client-side record of a long-running operation.

use crate::types::{OperationStatus, OperationStatusBody, RemoteError};

/// Rejected status change on an [`Operation`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("operation {id}: invalid status transition {from} -> {to}")]
pub struct TransitionError {
    pub id: String,
    pub from: OperationStatus,
    pub to: OperationStatus,
}

/// An operation accepted by the management API and not yet discarded.
///
/// Status only moves forward; once `Succeeded` or `Failed` the record is
/// frozen.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    id: String,
    status: OperationStatus,
    http_status: Option<u16>,
    result: Option<serde_json::Value>,
    error: Option<RemoteError>,
}

impl Operation {
    /// Creates a pending operation for the given request id.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: OperationStatus::Pending,
            http_status: None,
            result: None,
            error: None,
        }
    }

    /// Applies one observed status body.
    ///
    /// `raw` is the body as received; it becomes the result once the
    /// operation reaches a terminal status.
    pub fn advance(
        &mut self,
        observed: &OperationStatusBody,
        raw: serde_json::Value,
    ) -> Result<(), TransitionError> {
        let next = observed.status;
        if !can_transition(self.status, next) {
            return Err(TransitionError {
                id: self.id.clone(),
                from: self.status,
                to: next,
            });
        }

        self.status = next;
        if next.is_terminal() {
            self.http_status = observed.http_status_code;
            self.error = observed.error.clone();
            self.result = Some(raw);
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// HTTP status carried by the terminal status body.
    pub fn http_status(&self) -> Option<u16> {
        self.http_status
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&RemoteError> {
        self.error.as_ref()
    }

    /// Consumes the record, returning the terminal body.
    pub fn into_result(self) -> Option<serde_json::Value> {
        self.result
    }
}

fn can_transition(from: OperationStatus, to: OperationStatus) -> bool {
    use OperationStatus::*;
    match from {
        Pending => true,
        InProgress => to != Pending,
        Succeeded | Failed => false,
    }
}
