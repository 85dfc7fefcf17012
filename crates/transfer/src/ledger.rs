//! Per-upload record of the chunks already accepted by the destination.
//!
//! Stored in the local cache under `upload_meta_<id>`. On resume the
//! checksums of chunks the destination claims to hold are recomputed from
//! the local payload; if any differ, the payload changed since the first
//! attempt and the upload starts over.

use serde::{Deserialize, Serialize};
use tracing::debug;

use darkroom_protocol::constants::upload_meta_key;
use darkroom_queue::{LocalCache, QueueError, load_json, store_json};

use crate::TransferError;
use crate::chunked::checksum_bytes;

/// One acknowledged chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub offset: u64,
    pub len: u64,
    pub checksum: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeLedger {
    /// Destination the chunks were sent to. A new destination invalidates the ledger.
    pub url: String,
    pub total: u64,
    #[serde(default)]
    pub chunks: Vec<ChunkRecord>,
}

impl ResumeLedger {
    pub fn new(url: impl Into<String>, total: u64) -> Self {
        Self {
            url: url.into(),
            total,
            chunks: Vec::new(),
        }
    }

    pub fn load(cache: &dyn LocalCache, id: &str) -> Result<Option<Self>, QueueError> {
        load_json(cache, &upload_meta_key(id))
    }

    pub fn save(&self, cache: &dyn LocalCache, id: &str) -> Result<(), QueueError> {
        store_json(cache, &upload_meta_key(id), self)
    }

    pub fn remove(cache: &dyn LocalCache, id: &str) -> Result<(), QueueError> {
        cache.remove(&upload_meta_key(id))
    }

    /// Whether this ledger describes an upload of `total` bytes to `url`.
    pub fn matches(&self, url: &str, total: u64) -> bool {
        self.url == url && self.total == total
    }

    pub fn record(&mut self, offset: u64, len: u64, checksum: String) {
        self.chunks.retain(|c| c.offset != offset);
        self.chunks.push(ChunkRecord {
            offset,
            len,
            checksum,
        });
    }

    /// Checks every recorded chunk that ends at or before `upto` against `data`.
    pub fn verify(&self, data: &[u8], upto: u64) -> Result<(), TransferError> {
        for chunk in self.chunks.iter().filter(|c| c.offset + c.len <= upto) {
            let start = chunk.offset as usize;
            let end = (chunk.offset + chunk.len) as usize;
            let Some(slice) = data.get(start..end) else {
                return Err(TransferError::DifferentChunk {
                    offset: chunk.offset,
                });
            };
            if checksum_bytes(slice) != chunk.checksum {
                return Err(TransferError::DifferentChunk {
                    offset: chunk.offset,
                });
            }
        }
        debug!(upto, chunks = self.chunks.len(), "resume ledger verified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use darkroom_queue::MemoryCache;

    fn ledger_for(data: &[u8], chunk: usize) -> ResumeLedger {
        let mut ledger = ResumeLedger::new("https://up/1", data.len() as u64);
        for (i, part) in data.chunks(chunk).enumerate() {
            ledger.record(
                (i * chunk) as u64,
                part.len() as u64,
                checksum_bytes(part),
            );
        }
        ledger
    }

    #[test]
    fn save_load_remove() {
        let cache = MemoryCache::new();
        let ledger = ledger_for(b"abcdefgh", 4);
        ledger.save(&cache, "u1").unwrap();
        assert!(cache.get("upload_meta_u1").unwrap().is_some());

        assert_eq!(ResumeLedger::load(&cache, "u1").unwrap(), Some(ledger));
        ResumeLedger::remove(&cache, "u1").unwrap();
        assert!(ResumeLedger::load(&cache, "u1").unwrap().is_none());
    }

    #[test]
    fn verify_accepts_unchanged_payload() {
        let ledger = ledger_for(b"abcdefgh", 4);
        ledger.verify(b"abcdefgh", 8).unwrap();
    }

    #[test]
    fn verify_detects_changed_bytes() {
        let ledger = ledger_for(b"abcdefgh", 4);
        let err = ledger.verify(b"abcdXfgh", 8).unwrap_err();
        assert!(matches!(err, TransferError::DifferentChunk { offset: 4 }));
    }

    #[test]
    fn verify_ignores_chunks_past_remote_offset() {
        let ledger = ledger_for(b"abcdefgh", 4);
        ledger.verify(b"abcdXfgh", 4).unwrap();
    }

    #[test]
    fn record_replaces_same_offset() {
        let mut ledger = ResumeLedger::new("u", 8);
        ledger.record(0, 4, "a".into());
        ledger.record(0, 4, "b".into());
        assert_eq!(ledger.chunks.len(), 1);
        assert_eq!(ledger.chunks[0].checksum, "b");
    }

    #[test]
    fn matches_destination() {
        let ledger = ResumeLedger::new("https://up/1", 8);
        assert!(ledger.matches("https://up/1", 8));
        assert!(!ledger.matches("https://up/2", 8));
        assert!(!ledger.matches("https://up/1", 9));
    }
}
