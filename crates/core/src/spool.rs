//! Spooled scratch storage for fetched payloads
//!
//! Each fetch writes its bytes into its own [`Spool`]: memory up to a
//! threshold, a temporary file beyond it. Storage is released on drop, on
//! success and error paths alike.

use std::io::{self, Read, Seek, SeekFrom, Write};

use tempfile::SpooledTempFile;

use crate::error::{Error, Result};

/// Size-checked spooled buffer
#[derive(Debug)]
pub struct Spool {
    inner: SpooledTempFile,
    written: u64,
    limit: Option<u64>,
}

impl Spool {
    /// Create an empty spool that spills to disk past `threshold` bytes
    pub fn new(threshold: usize, limit: Option<u64>) -> Self {
        Self {
            inner: SpooledTempFile::new(threshold),
            written: 0,
            limit,
        }
    }

    /// Append a chunk, failing as soon as the running total passes the limit
    pub fn push(&mut self, chunk: &[u8]) -> Result<()> {
        self.written += chunk.len() as u64;
        if let Some(limit) = self.limit {
            if self.written > limit {
                return Err(Error::SizeLimitExceeded { limit });
            }
        }
        self.inner.write_all(chunk)?;
        Ok(())
    }

    /// Total bytes written so far
    pub fn len(&self) -> u64 {
        self.written
    }

    pub fn is_empty(&self) -> bool {
        self.written == 0
    }

    /// Whether the payload has spilled to a temporary file
    pub fn is_on_disk(&self) -> bool {
        self.inner.is_rolled()
    }

    /// Flush pending writes and seek back to the start
    pub fn rewind(&mut self) -> Result<()> {
        self.inner.flush()?;
        self.inner.seek(SeekFrom::Start(0))?;
        Ok(())
    }
}

impl Read for Spool {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for Spool {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}
