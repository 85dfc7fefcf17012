use sha2::{Digest, Sha256};

use crate::DEFAULT_CHUNK_SIZE;

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Number of chunks needed for `total` bytes (an empty payload still takes one).
pub fn chunk_count(total: u64, chunk_size: usize) -> u64 {
    let chunk_size = chunk_size.max(1) as u64;
    total.div_ceil(chunk_size).max(1)
}

/// A borrowed slice of the payload plus its position.
#[derive(Debug, Clone)]
pub struct Chunk<'a> {
    /// Byte offset within the payload.
    pub offset: u64,
    pub data: &'a [u8],
    /// SHA-256 hex checksum of `data`.
    pub checksum: String,
}

impl Chunk<'_> {
    /// Offset of the last byte in this chunk (inclusive).
    pub fn last_byte(&self) -> u64 {
        self.offset + self.data.len() as u64 - 1
    }
}

/// Splits an in-memory payload into fixed-size chunks with checksums.
pub struct ChunkReader<'a> {
    data: &'a [u8],
    chunk_size: usize,
    offset: usize,
}

impl<'a> ChunkReader<'a> {
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(data: &'a [u8], chunk_size: usize) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            data,
            chunk_size,
            offset: 0,
        }
    }

    /// Moves the read position (for resume). Clamped to the payload size.
    pub fn seek_to(&mut self, offset: u64) {
        self.offset = (offset as usize).min(self.data.len());
    }

    /// Returns the next chunk, or `None` at the end.
    pub fn next_chunk(&mut self) -> Option<Chunk<'a>> {
        if self.offset >= self.data.len() {
            return None;
        }
        let end = (self.offset + self.chunk_size).min(self.data.len());
        let data = &self.data[self.offset..end];
        let chunk = Chunk {
            offset: self.offset as u64,
            data,
            checksum: checksum_bytes(data),
        };
        self.offset = end;
        Some(chunk)
    }

    pub fn offset(&self) -> u64 {
        self.offset as u64
    }

    pub fn total(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn remaining(&self) -> u64 {
        (self.data.len() - self.offset) as u64
    }
}
