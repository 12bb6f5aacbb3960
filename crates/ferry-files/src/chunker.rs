//! File chunking.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::{DEFAULT_CHUNK_SIZE, FileError, MAX_CHUNK_SIZE};

/// Chunk a file into fixed-size pieces
#[derive(Debug, Clone, Copy)]
pub struct FileChunker {
    chunk_size: usize,
}

impl FileChunker {
    /// Create a new chunker with default chunk size
    #[must_use]
    pub fn new() -> Self {
        Self::with_chunk_size(DEFAULT_CHUNK_SIZE)
    }

    /// Create a new chunker with custom chunk size, clamped to
    /// `1..=MAX_CHUNK_SIZE`
    #[must_use]
    pub fn with_chunk_size(size: usize) -> Self {
        Self {
            chunk_size: size.clamp(1, MAX_CHUNK_SIZE),
        }
    }

    /// Get chunk size
    #[must_use]
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Calculate number of chunks for a file
    #[must_use]
    pub fn chunk_count(&self, file_size: u64) -> u64 {
        file_size.div_ceil(self.chunk_size as u64)
    }

    /// Index of the chunk containing `offset`
    #[must_use]
    pub fn chunk_index(&self, offset: u64) -> u64 {
        offset / self.chunk_size as u64
    }

    /// Wrap a reader so it yields at most `total` bytes in chunk-sized pieces
    pub fn reader<R: AsyncRead + Unpin>(&self, inner: R, total: u64) -> ChunkReader<R> {
        ChunkReader {
            inner,
            chunk_size: self.chunk_size,
            total,
            read: 0,
        }
    }
}

impl Default for FileChunker {
    fn default() -> Self {
        Self::new()
    }
}

/// Reads a source in full chunks, never past the declared size
pub struct ChunkReader<R> {
    inner: R,
    chunk_size: usize,
    total: u64,
    read: u64,
}

impl<R: AsyncRead + Unpin> ChunkReader<R> {
    /// Bytes handed out so far
    pub fn bytes_read(&self) -> u64 {
        self.read
    }

    /// Read the next chunk.
    ///
    /// Returns `Ok(None)` once `total` bytes were produced. A source that
    /// ends early yields [`FileError::SourceChanged`].
    pub async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, FileError> {
        let remaining = self.total - self.read;
        if remaining == 0 {
            return Ok(None);
        }

        let want = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            let n = self.inner.read(&mut buf[filled..]).await?;
            if n == 0 {
                return Err(FileError::SourceChanged {
                    expected: self.total,
                    actual: self.read + filled as u64,
                });
            }
            filled += n;
        }

        self.read += want as u64;
        Ok(Some(buf))
    }
}
