//! Chunked file transport with resume support and progress reporting.
//!
//! A [`ChunkedTransport`] streams one payload to its signed destination in
//! fixed-size chunks and calls back after every chunk. The shipped
//! implementation, [`ResumableHttpTransport`], speaks the resumable-upload
//! protocol used by object stores (`Content-Range` PUTs answered with
//! `308 Resume Incomplete`) and keeps a checksum ledger so a restarted
//! process can continue where the previous one stopped.

mod chunked;
mod http;
mod ledger;
mod progress;
mod transport;

pub use chunked::{Chunk, ChunkReader, checksum_bytes, chunk_count};
pub use http::ResumableHttpTransport;
pub use ledger::{ChunkRecord, ResumeLedger};
pub use progress::{ChunkProgress, SpeedCalculator};
pub use transport::{ChunkedTransport, ProgressFn, TransferFuture, TransferJob};

pub use darkroom_protocol::constants::CHUNK_SIZE as DEFAULT_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("destination answered {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed Range header: {0}")]
    BadRange(String),

    #[error("local file differs from the bytes already uploaded (chunk at offset {offset})")]
    DifferentChunk { offset: u64 },

    #[error("ledger error: {0}")]
    Ledger(#[from] darkroom_queue::QueueError),

    #[error("destination holds {acknowledged} of {total} bytes after the last chunk")]
    Incomplete { acknowledged: u64, total: u64 },

    #[error("cancelled")]
    Cancelled,
}
