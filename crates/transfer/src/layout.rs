use cloudctl_protocol::{ObjectKind, block_id};

use crate::TransferError;
use crate::chunked::ChunkDescriptor;
use crate::remote::ChunkWrite;

/// Page size of page blobs.
pub const PAGE_ALIGNMENT: u64 = 512;

/// How chunks map onto the remote object, chosen once per job from the
/// object kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkLayout {
    /// Chunks are staged independently and committed as an ordered list.
    SequentialChunked,
    /// Chunks are written in place at offsets that respect `alignment`.
    AlignedChunked { alignment: u64 },
}

impl ChunkLayout {
    pub fn for_kind(kind: ObjectKind) -> Self {
        match kind {
            ObjectKind::BlockBlob => Self::SequentialChunked,
            ObjectKind::PageBlob => Self::AlignedChunked {
                alignment: PAGE_ALIGNMENT,
            },
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Self::SequentialChunked => ObjectKind::BlockBlob,
            Self::AlignedChunked { .. } => ObjectKind::PageBlob,
        }
    }

    /// Checks that `chunk_size` keeps every chunk boundary aligned.
    pub fn validate_chunk_size(&self, chunk_size: u64) -> Result<(), TransferError> {
        match self {
            Self::AlignedChunked { alignment } if chunk_size % alignment != 0 => {
                Err(TransferError::Validation(format!(
                    "chunk size {chunk_size} is not a multiple of {alignment} bytes"
                )))
            }
            _ => Ok(()),
        }
    }

    /// Size the remote object is created with.
    pub fn remote_size(&self, total_size: u64) -> u64 {
        match self {
            Self::SequentialChunked => total_size,
            Self::AlignedChunked { alignment } => total_size.next_multiple_of(*alignment),
        }
    }

    /// Turns the bytes of `chunk` into the write to send, or `None` when
    /// nothing needs to be sent.
    ///
    /// Empty blocks are never staged. Page ranges of zeros are skipped
    /// because a freshly created page blob already reads as zeros; an
    /// unaligned tail is zero-padded up to the page boundary.
    pub fn prepare(&self, chunk: &ChunkDescriptor, mut data: Vec<u8>) -> Option<ChunkWrite> {
        if data.is_empty() {
            return None;
        }
        match self {
            Self::SequentialChunked => Some(ChunkWrite::Block {
                block_id: block_id(chunk.index as u64),
                data,
            }),
            Self::AlignedChunked { alignment } => {
                if data.iter().all(|&b| b == 0) {
                    return None;
                }
                let padded = (data.len() as u64).next_multiple_of(*alignment);
                data.resize(padded as usize, 0);
                Some(ChunkWrite::Pages {
                    offset: chunk.offset,
                    data,
                })
            }
        }
    }

    /// Block ids to commit, in original byte order.
    pub fn block_ids(&self, chunks: &[ChunkDescriptor]) -> Vec<String> {
        match self {
            Self::SequentialChunked => chunks
                .iter()
                .filter(|c| c.length > 0)
                .map(|c| block_id(c.index as u64))
                .collect(),
            Self::AlignedChunked { .. } => Vec::new(),
        }
    }
}
