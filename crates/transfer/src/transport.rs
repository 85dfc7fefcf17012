use std::future::Future;
use std::pin::Pin;

use tokio_util::sync::CancellationToken;

use darkroom_protocol::{Destination, FilePayload};

use crate::TransferError;
use crate::progress::ChunkProgress;

/// Called after every acknowledged chunk.
pub type ProgressFn<'a> = &'a (dyn Fn(ChunkProgress) + Send + Sync);

/// Boxed future returned by [`ChunkedTransport::upload`].
pub type TransferFuture<'a> = Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send + 'a>>;

/// One payload and where it goes.
#[derive(Debug, Clone, Copy)]
pub struct TransferJob<'a> {
    /// Upload id; keys the resume ledger.
    pub id: &'a str,
    pub file: &'a FilePayload,
    pub destination: &'a Destination,
    pub chunk_size: usize,
}

/// Streams a payload to a signed destination.
///
/// Implementations must stop promptly with [`TransferError::Cancelled`]
/// once `cancel` fires, and must call `on_progress` after each chunk.
pub trait ChunkedTransport: Send + Sync {
    fn upload<'a>(
        &'a self,
        job: TransferJob<'a>,
        on_progress: ProgressFn<'a>,
        cancel: CancellationToken,
    ) -> TransferFuture<'a>;
}
