use base64::{Engine, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
use tracing::warn;

use crate::TransferError;
use crate::chunked::LocalFile;

const HASH_BLOCK_SIZE: u64 = 1024 * 1024;

/// Computes the base64-encoded MD5 of `data`, the form stored as object
/// content-hash metadata.
pub fn content_md5(data: &[u8]) -> String {
    STANDARD.encode(Md5::digest(data))
}

/// Computes the base64-encoded MD5 of the first `len` bytes of `file`.
///
/// Reads sequentially in fixed-size blocks, so memory use does not depend
/// on the file size. Blocking; run it on the blocking pool.
pub fn file_md5(file: &LocalFile, len: u64) -> Result<String, TransferError> {
    let mut hasher = Md5::new();
    let mut offset = 0;
    while offset < len {
        let n = (len - offset).min(HASH_BLOCK_SIZE);
        hasher.update(file.read_at(offset, n)?);
        offset += n;
    }
    Ok(STANDARD.encode(hasher.finalize()))
}

/// Integrity result attached to a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumStatus {
    /// The caller did not ask for a checksum.
    NotRequested,
    /// Upload: digest computed and attached to the object.
    Attached { md5: String },
    /// Download: local digest equals the stored one.
    Verified { md5: String },
    /// Download: the object carries no stored digest.
    MissingRemote { local_md5: String },
}

impl ChecksumStatus {
    /// Warning text for outcomes the caller should surface.
    pub fn warning(&self) -> Option<String> {
        match self {
            Self::MissingRemote { local_md5 } => Some(format!(
                "object has no stored MD5; local MD5 is {local_md5}"
            )),
            _ => None,
        }
    }
}

/// Compares a locally computed digest against the object's stored digest.
///
/// A missing stored digest is not an error: the outcome carries the local
/// digest and a warning is logged.
pub fn verify_checksum(stored: Option<&str>, local: String) -> Result<ChecksumStatus, TransferError> {
    match stored.filter(|s| !s.is_empty()) {
        None => {
            warn!(local_md5 = %local, "object has no stored MD5, skipping verification");
            Ok(ChecksumStatus::MissingRemote { local_md5: local })
        }
        Some(expected) if expected == local => Ok(ChecksumStatus::Verified { md5: local }),
        Some(expected) => Err(TransferError::ChecksumMismatch {
            expected: expected.to_string(),
            actual: local,
        }),
    }
}
