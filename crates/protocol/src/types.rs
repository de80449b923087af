use std::fmt;
use std::str::FromStr;

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Long-running operations
// ---------------------------------------------------------------------------

/// Status reported by the operation-status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OperationStatus {
    Pending,
    InProgress,
    Succeeded,
    Failed,
}

impl OperationStatus {
    /// Returns `true` for `Succeeded` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
        };
        f.write_str(s)
    }
}

/// Error payload carried by a failed operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RemoteError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.code.is_empty() {
            f.write_str(&self.message)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// Body returned when polling an operation by request id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationStatusBody {
    #[serde(rename = "ID", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub status: OperationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// Raw response to a submitted management call.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    /// HTTP status code of the submission.
    pub status: u16,
    /// Request identifier used to poll an accepted operation.
    pub request_id: Option<String>,
    pub body: serde_json::Value,
}

impl ApiResponse {
    /// Creates a response with no request id.
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self {
            status,
            request_id: None,
            body,
        }
    }

    /// Creates an accepted (asynchronous) response carrying a request id.
    pub fn accepted(status: u16, request_id: impl Into<String>) -> Self {
        Self {
            status,
            request_id: Some(request_id.into()),
            body: serde_json::Value::Null,
        }
    }

    /// Returns `true` for 2xx statuses.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ---------------------------------------------------------------------------
// Listing
// ---------------------------------------------------------------------------

/// One page of a listing call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continuation_token: Option<String>,
}

impl<T> Page<T> {
    /// Creates a page; an empty token is treated as the final page.
    pub fn new(items: Vec<T>, continuation_token: Option<String>) -> Self {
        Self {
            items,
            continuation_token,
        }
    }

    /// Creates the final page of a listing.
    pub fn last(items: Vec<T>) -> Self {
        Self::new(items, None)
    }

    /// Continuation marker for the next page, if any.
    pub fn next_token(&self) -> Option<&str> {
        self.continuation_token
            .as_deref()
            .filter(|token| !token.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Objects
// ---------------------------------------------------------------------------

/// Declared type of a stored object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectKind {
    /// Assembled from independently staged blocks committed as a list.
    BlockBlob,
    /// Fixed-size, 512-byte aligned random-access pages.
    PageBlob,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BlockBlob => f.write_str("BlockBlob"),
            Self::PageBlob => f.write_str("PageBlob"),
        }
    }
}

/// Returned when a caller-supplied object kind is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown object kind: {0}")]
pub struct UnknownObjectKind(pub String);

impl FromStr for ObjectKind {
    type Err = UnknownObjectKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "block" | "blockblob" => Ok(Self::BlockBlob),
            "page" | "pageblob" => Ok(Self::PageBlob),
            _ => Err(UnknownObjectKind(s.to_string())),
        }
    }
}

/// Properties of a stored object as returned by the data plane.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ObjectProperties {
    pub name: String,
    #[serde(rename = "ContentLength")]
    pub size: u64,
    #[serde(rename = "BlobType")]
    pub kind: ObjectKind,
    /// Base64-encoded MD5 of the full content, when the uploader attached one.
    #[serde(
        rename = "ContentMD5",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub content_md5: Option<String>,
}

/// Builds the block identifier for the chunk at `index`.
///
/// All ids of one object must have the same encoded length, so the index is
/// zero-padded before encoding.
pub fn block_id(index: u64) -> String {
    STANDARD.encode(format!("block-{index:010}"))
}
