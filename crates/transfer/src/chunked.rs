use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use crate::TransferError;

/// A contiguous byte range of an object: the unit of parallel transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// Position of the chunk in original byte order.
    pub index: usize,
    /// Byte offset within the object.
    pub offset: u64,
    /// Length of the range in bytes.
    pub length: u64,
}

impl ChunkDescriptor {
    /// One past the last byte of the range.
    pub fn end(&self) -> u64 {
        self.offset + self.length
    }
}

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Splits an object of `total_size` bytes into gapless, non-overlapping
/// chunks of `chunk_size` bytes (the last one may be shorter).
///
/// An empty object still yields one zero-length chunk so that it gets
/// created remotely.
pub fn plan_chunks(total_size: u64, chunk_size: u64) -> Result<Vec<ChunkDescriptor>, TransferError> {
    if chunk_size == 0 {
        return Err(TransferError::Validation(
            "chunk size must be greater than zero".into(),
        ));
    }

    if total_size == 0 {
        return Ok(vec![ChunkDescriptor {
            index: 0,
            offset: 0,
            length: 0,
        }]);
    }

    let count = total_size.div_ceil(chunk_size);
    let chunks = (0..count)
        .map(|i| {
            let offset = i * chunk_size;
            ChunkDescriptor {
                index: i as usize,
                offset,
                length: chunk_size.min(total_size - offset),
            }
        })
        .collect();
    Ok(chunks)
}

// ---------------------------------------------------------------------------
// LocalFile
// ---------------------------------------------------------------------------

/// Local file accessed only through positional reads and writes, so that
/// concurrent workers never share a cursor.
#[derive(Debug)]
pub struct LocalFile {
    file: File,
    path: PathBuf,
}

impl LocalFile {
    /// Opens an existing file for positional reads.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = File::open(path)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Creates (or truncates) a destination file pre-sized to `size` bytes.
    pub fn create(path: &Path, size: u64) -> Result<Self, TransferError> {
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size)?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Current file size in bytes.
    pub fn len(&self) -> Result<u64, TransferError> {
        Ok(self.file.metadata()?.len())
    }

    /// Returns `true` if the file is empty.
    pub fn is_empty(&self) -> Result<bool, TransferError> {
        Ok(self.len()? == 0)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads exactly `len` bytes starting at `offset`.
    pub fn read_at(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        let mut buf = vec![0u8; len as usize];
        read_exact_at(&self.file, &mut buf, offset)?;
        Ok(buf)
    }

    /// Writes all of `data` starting at `offset`.
    pub fn write_at(&self, offset: u64, data: &[u8]) -> Result<(), TransferError> {
        write_all_at(&self.file, data, offset)?;
        Ok(())
    }

    /// Flushes file contents to disk.
    pub fn sync(&self) -> Result<(), TransferError> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(unix)]
fn write_all_at(file: &File, data: &[u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.write_all_at(data, offset)
}

#[cfg(windows)]
fn read_exact_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !buf.is_empty() {
        match file.seek_read(buf, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "failed to fill whole buffer",
                ));
            }
            n => {
                buf = &mut buf[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}

#[cfg(windows)]
fn write_all_at(file: &File, mut data: &[u8], mut offset: u64) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;
    while !data.is_empty() {
        match file.seek_write(data, offset)? {
            0 => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "failed to write whole buffer",
                ));
            }
            n => {
                data = &data[n..];
                offset += n as u64;
            }
        }
    }
    Ok(())
}
