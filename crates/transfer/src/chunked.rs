use std::collections::HashMap;
use std::io::{Read, SeekFrom};
use std::path::{Path, PathBuf};

use tokio::io::{AsyncSeekExt, AsyncWriteExt};

use crate::types::{ByteRange, Chunk};
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

fn effective_chunk_size(chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    }
}

/// Number of ranges [`plan_chunks`] yields, without building them.
pub fn chunk_count(file_size: u64, chunk_size: u64) -> u64 {
    file_size.div_ceil(effective_chunk_size(chunk_size))
}

/// Splits `file_size` bytes into contiguous ranges of at most `chunk_size`.
///
/// The last range holds the remainder. A zero-byte file yields no ranges.
pub fn plan_chunks(file_size: u64, chunk_size: u64) -> Vec<ByteRange> {
    let chunk_size = effective_chunk_size(chunk_size);
    let mut ranges = Vec::with_capacity(chunk_count(file_size, chunk_size) as usize);
    let mut start = 0;
    while start < file_size {
        let len = chunk_size.min(file_size - start);
        ranges.push(ByteRange::new(start, len));
        start += len;
    }
    ranges
}

/// Reads an upload source in fixed-size chunks, front to back.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: u64,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path`; a `chunk_size` of 0 means [`DEFAULT_CHUNK_SIZE`].
    pub fn new(path: &Path, chunk_size: u64) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = effective_chunk_size(chunk_size);
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
        })
    }

    /// Reads the next chunk. Returns `None` at EOF.
    ///
    /// Reads exactly `chunk_size` bytes unless fewer remain; a file that
    /// shrinks underneath the reader is an error rather than a short chunk.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size);
        let mut buf = vec![0u8; read_size as usize];
        self.file.read_exact(&mut buf)?;

        let chunk = Chunk {
            range: ByteRange::new(self.offset, read_size),
            data: buf,
        };
        self.offset += read_size;
        Ok(Some(chunk))
    }

    /// Reads the whole remaining file in one buffer.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, TransferError> {
        let mut buf = Vec::with_capacity(self.remaining() as usize);
        self.file.read_to_end(&mut buf)?;
        self.offset += buf.len() as u64;
        Ok(buf)
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size.saturating_sub(self.offset)
    }
}

/// Writes downloaded bytes to files under a destination directory.
///
/// Every relative path is validated before it is joined to the base, so a
/// hostile name cannot escape the directory. Each file keeps one open
/// handle from [`begin`](Self::begin) until [`finish`](Self::finish).
pub struct ChunkWriter {
    dest_dir: PathBuf,
    open: HashMap<String, OpenFile>,
}

struct OpenFile {
    file: tokio::fs::File,
    /// Highest byte offset written so far.
    written: u64,
    /// Where the handle's cursor sits.
    position: u64,
}

impl ChunkWriter {
    pub fn new(dest_dir: &Path) -> Self {
        Self {
            dest_dir: dest_dir.to_path_buf(),
            open: HashMap::new(),
        }
    }

    /// Creates (or truncates) `relative_path` and its parent directories.
    pub async fn begin(&mut self, relative_path: &str) -> Result<PathBuf, TransferError> {
        let full_path = self.resolve(relative_path)?;
        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let file = tokio::fs::File::create(&full_path).await?;
        self.open.insert(
            relative_path.to_string(),
            OpenFile {
                file,
                written: 0,
                position: 0,
            },
        );
        Ok(full_path)
    }

    /// Writes `data` at `offset` inside `relative_path`, opening it without
    /// truncation if [`begin`](Self::begin) was not called.
    pub async fn write_at(
        &mut self,
        relative_path: &str,
        offset: u64,
        data: &[u8],
    ) -> Result<(), TransferError> {
        if !self.open.contains_key(relative_path) {
            let full_path = self.resolve(relative_path)?;
            if let Some(parent) = full_path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            let file = tokio::fs::OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(false)
                .open(&full_path)
                .await?;
            self.open.insert(
                relative_path.to_string(),
                OpenFile {
                    file,
                    written: 0,
                    position: 0,
                },
            );
        }
        let Some(open) = self.open.get_mut(relative_path) else {
            return Err(TransferError::InvalidPath(relative_path.to_string()));
        };

        if open.position != offset {
            open.file.seek(SeekFrom::Start(offset)).await?;
        }
        open.file.write_all(data).await?;
        open.position = offset + data.len() as u64;
        open.written = open.written.max(open.position);
        Ok(())
    }

    /// Appends `data` after the last byte written to `relative_path`.
    pub async fn append(&mut self, relative_path: &str, data: &[u8]) -> Result<(), TransferError> {
        let offset = self.written_offset(relative_path);
        self.write_at(relative_path, offset, data).await
    }

    /// Flushes and closes `relative_path`, returning the bytes written.
    pub async fn finish(&mut self, relative_path: &str) -> Result<u64, TransferError> {
        let Some(mut open) = self.open.remove(relative_path) else {
            return Ok(0);
        };
        open.file.flush().await?;
        Ok(open.written)
    }

    /// Highest byte offset written to an open `relative_path`.
    pub fn written_offset(&self, relative_path: &str) -> u64 {
        self.open.get(relative_path).map_or(0, |f| f.written)
    }

    fn resolve(&self, relative_path: &str) -> Result<PathBuf, TransferError> {
        crate::validate_relative_path(relative_path)?;
        Ok(self.dest_dir.join(relative_path))
    }
}
