//! Data-plane seam implemented by the storage client.
//!
//! The engine only ever talks to a [`RemoteObject`]; the command layer
//! supplies an implementation bound to one object of one container.

use cloudctl_protocol::{ObjectKind, ObjectProperties};

use crate::chunked::ChunkDescriptor;
use crate::{BoxFuture, TransferError};

/// One chunk as it is written to the remote object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkWrite {
    /// Staged block of a block blob, committed later by id.
    Block { block_id: String, data: Vec<u8> },
    /// Aligned page range of a page blob, written in place.
    Pages { offset: u64, data: Vec<u8> },
}

/// Finalization request sent after every chunk was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectCommit {
    pub kind: ObjectKind,
    /// Logical object size in bytes.
    pub size: u64,
    /// Block ids in original byte order (block blobs only).
    pub block_ids: Vec<String>,
    /// Base64 MD5 to store as content-hash metadata.
    pub content_md5: Option<String>,
}

/// A single remote object addressed by the transfer.
pub trait RemoteObject: Send + Sync {
    /// Object name, used in errors and logs.
    fn name(&self) -> &str;

    /// Returns the object's properties, or `None` if it does not exist.
    fn properties(&self) -> BoxFuture<'_, Result<Option<ObjectProperties>, TransferError>>;

    /// Prepares the object for upload. `size` is the remote size, already
    /// rounded up to the layout's alignment.
    fn create(&self, kind: ObjectKind, size: u64) -> BoxFuture<'_, Result<(), TransferError>>;

    /// Writes one chunk.
    fn write_chunk(&self, write: ChunkWrite) -> BoxFuture<'_, Result<(), TransferError>>;

    /// Reads the byte range described by `chunk`.
    fn read_chunk(&self, chunk: ChunkDescriptor) -> BoxFuture<'_, Result<Vec<u8>, TransferError>>;

    /// Finalizes an upload.
    fn commit(&self, commit: ObjectCommit) -> BoxFuture<'_, Result<(), TransferError>>;
}
