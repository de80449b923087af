//! Long-running operation completion.
//!
//! A management call either finishes synchronously (HTTP 200) or is
//! accepted with a request id. Accepted operations are polled through
//! [`OperationApi::operation_status`] until their status is terminal.

use std::future::Future;
use std::time::Duration;

use cloudctl_protocol::{ApiResponse, Operation, OperationStatus, OperationStatusBody};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::api::OperationApi;
use crate::error::ControlError;

/// Default pause between consecutive status calls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// HTTP status reported for a failed operation whose body carries none.
const DEFAULT_FAILED_STATUS: u16 = 500;

/// Polling bounds. The default polls every second with no limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between consecutive status calls.
    pub interval: Duration,
    /// Maximum number of status calls; at least 1 when set.
    pub max_attempts: Option<u32>,
    /// Maximum time spent polling, measured from acceptance.
    pub timeout: Option<Duration>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            timeout: None,
        }
    }
}

impl PollPolicy {
    /// Rejects bounds no poll could satisfy.
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.max_attempts == Some(0) {
            return Err(ControlError::Validation(
                "poll max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Terminal successful result of a submitted operation.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationOutcome {
    /// HTTP status of the submission, or the one carried by the final
    /// status body.
    pub http_status: u16,
    /// Submission body, or the final status body.
    pub body: serde_json::Value,
    /// Request id when the operation was polled.
    pub request_id: Option<String>,
}

/// Drives one submitted operation to completion.
pub struct LongRunningOperationPoller<'a> {
    api: &'a dyn OperationApi,
    policy: PollPolicy,
    cancel: CancellationToken,
}

impl<'a> LongRunningOperationPoller<'a> {
    pub fn new(api: &'a dyn OperationApi, policy: PollPolicy, cancel: CancellationToken) -> Self {
        Self {
            api,
            policy,
            cancel,
        }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Awaits `submit` and, if the operation was accepted rather than
    /// completed, polls it to a terminal status.
    ///
    /// - 200: returned as is, no polling.
    /// - other 2xx with a request id: polled.
    /// - other 2xx without a request id: nothing to poll, returned as is.
    /// - non-2xx: mapped with [`ControlError::from_status`].
    pub async fn execute<S>(&self, submit: S) -> Result<OperationOutcome, ControlError>
    where
        S: Future<Output = Result<ApiResponse, ControlError>>,
    {
        self.policy.validate()?;
        self.check_cancelled()?;

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(ControlError::Cancelled),
            r = submit => r?,
        };

        if !response.is_success() {
            warn!(status = response.status, "submission rejected");
            return Err(ControlError::from_status(response.status, &response.body));
        }

        let request_id = match response.request_id {
            Some(id) if response.status != 200 && !id.is_empty() => id,
            request_id => {
                if response.status != 200 {
                    debug!(
                        status = response.status,
                        "accepted without request id, treating as complete"
                    );
                }
                return Ok(OperationOutcome {
                    http_status: response.status,
                    body: response.body,
                    request_id,
                });
            }
        };

        info!(
            request_id = %request_id,
            status = response.status,
            "operation accepted, polling status"
        );
        self.poll(request_id).await
    }

    /// Polls the operation `request_id` until it is terminal.
    ///
    /// The first status call is issued immediately; later calls are spaced
    /// by the policy interval.
    pub async fn poll(&self, request_id: String) -> Result<OperationOutcome, ControlError> {
        self.policy.validate()?;
        let mut op = Operation::new(request_id.clone());
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            self.check_cancelled()?;

            let raw = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ControlError::Cancelled),
                r = self.api.operation_status(&request_id) => r?,
            };
            attempts += 1;

            let observed: OperationStatusBody = serde_json::from_value(raw.clone())?;
            op.advance(&observed, raw)?;
            debug!(
                request_id = %request_id,
                attempt = attempts,
                status = %op.status(),
                "operation status"
            );

            match op.status() {
                OperationStatus::Succeeded => {
                    let http_status = op.http_status().unwrap_or(200);
                    info!(request_id = %request_id, attempts, http_status, "operation succeeded");
                    return Ok(OperationOutcome {
                        http_status,
                        body: op.into_result().unwrap_or_default(),
                        request_id: Some(request_id),
                    });
                }
                OperationStatus::Failed => {
                    let status = op.http_status().unwrap_or(DEFAULT_FAILED_STATUS);
                    let error = op.error().cloned().unwrap_or_default();
                    warn!(request_id = %request_id, attempts, status, error = %error, "operation failed");
                    return Err(ControlError::OperationFailed { status, error });
                }
                OperationStatus::Pending | OperationStatus::InProgress => {}
            }

            if self.policy.max_attempts.is_some_and(|max| attempts >= max) {
                return Err(ControlError::Timeout { attempts });
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(ControlError::Cancelled),
                _ = tokio::time::sleep(self.policy.interval) => {}
            }

            if self
                .policy
                .timeout
                .is_some_and(|timeout| started.elapsed() >= timeout)
            {
                return Err(ControlError::Timeout { attempts });
            }
        }
    }

    fn check_cancelled(&self) -> Result<(), ControlError> {
        if self.cancel.is_cancelled() {
            Err(ControlError::Cancelled)
        } else {
            Ok(())
        }
    }
}
