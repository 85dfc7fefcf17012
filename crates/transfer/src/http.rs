//! Resumable uploads over HTTP.
//!
//! Each chunk is a `PUT` to the signed URL with
//! `Content-Range: bytes <first>-<last>/<total>`. The destination answers
//! `308` while it expects more bytes and `200`/`201` once the object is
//! complete. A status query (`Content-Range: bytes */<total>`, empty body)
//! returns the persisted range in the `Range` header.

use std::sync::Arc;

use reqwest::StatusCode;
use reqwest::header::{CONTENT_RANGE, CONTENT_TYPE, HeaderName, HeaderValue, RANGE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use darkroom_protocol::Destination;
use darkroom_queue::LocalCache;

use crate::TransferError;
use crate::chunked::{Chunk, ChunkReader};
use crate::ledger::ResumeLedger;
use crate::progress::ChunkProgress;
use crate::transport::{ChunkedTransport, ProgressFn, TransferFuture, TransferJob};

/// What the destination holds after a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RemoteState {
    /// Bytes `0..n` are persisted; more are expected.
    Partial(u64),
    Complete,
}

/// [`ChunkedTransport`] speaking the resumable-upload protocol.
pub struct ResumableHttpTransport {
    http: reqwest::Client,
    cache: Arc<dyn LocalCache>,
}

impl ResumableHttpTransport {
    /// Creates a transport that keeps its resume ledgers in `cache`.
    pub fn new(cache: Arc<dyn LocalCache>) -> Result<Self, TransferError> {
        // 308 means "resume incomplete" here, never a redirect to follow.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { http, cache })
    }

    fn request(&self, destination: &Destination, content_range: String) -> reqwest::RequestBuilder {
        let mut req = self
            .http
            .put(&destination.url)
            .header(CONTENT_RANGE, content_range);
        for (name, value) in &destination.fields {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => req = req.header(name, value),
                _ => warn!(field = %name, "skipping destination field that is not a valid header"),
            }
        }
        req
    }

    async fn send(&self, req: reqwest::RequestBuilder) -> Result<RemoteState, TransferError> {
        let resp = req.send().await?;
        let status = resp.status();

        if status == StatusCode::PERMANENT_REDIRECT {
            return match resp.headers().get(RANGE) {
                Some(value) => {
                    let raw = value.to_str().unwrap_or_default();
                    Ok(RemoteState::Partial(parse_range(raw)?))
                }
                None => Ok(RemoteState::Partial(0)),
            };
        }
        if status.is_success() {
            return Ok(RemoteState::Complete);
        }

        let body = resp.text().await.unwrap_or_default();
        Err(TransferError::Status {
            status: status.as_u16(),
            body,
        })
    }

    async fn query(&self, destination: &Destination, total: u64) -> Result<RemoteState, TransferError> {
        let req = self
            .request(destination, format!("bytes */{total}"))
            .body(Vec::new());
        self.send(req).await
    }

    async fn put_chunk(
        &self,
        destination: &Destination,
        mime_type: &str,
        chunk: &Chunk<'_>,
        total: u64,
    ) -> Result<RemoteState, TransferError> {
        let range = format!("bytes {}-{}/{total}", chunk.offset, chunk.last_byte());
        let req = self
            .request(destination, range)
            .header(CONTENT_TYPE, mime_type)
            .body(chunk.data.to_vec());
        self.send(req).await
    }

    /// Decides where to start: the remote offset if the ledger still
    /// vouches for the local bytes, 0 otherwise.
    async fn resume_point(
        &self,
        job: &TransferJob<'_>,
        ledger: &mut ResumeLedger,
    ) -> Result<RemoteState, TransferError> {
        let total = job.file.data.len() as u64;
        if ledger.chunks.is_empty() {
            return Ok(RemoteState::Partial(0));
        }

        match self.query(job.destination, total).await? {
            RemoteState::Complete => Ok(RemoteState::Complete),
            RemoteState::Partial(offset) => match ledger.verify(&job.file.data, offset) {
                Ok(()) => {
                    info!(id = %job.id, offset, total, "resuming upload");
                    Ok(RemoteState::Partial(offset))
                }
                Err(TransferError::DifferentChunk { offset: bad }) => {
                    warn!(id = %job.id, offset = bad, "local file changed since last attempt, restarting");
                    *ledger = ResumeLedger::new(&job.destination.url, total);
                    Ok(RemoteState::Partial(0))
                }
                Err(e) => Err(e),
            },
        }
    }

    async fn run(&self, job: TransferJob<'_>, on_progress: ProgressFn<'_>) -> Result<(), TransferError> {
        let total = job.file.data.len() as u64;
        let url = &job.destination.url;

        let mut ledger = match ResumeLedger::load(self.cache.as_ref(), job.id)? {
            Some(l) if l.matches(url, total) => l,
            Some(_) => {
                debug!(id = %job.id, "discarding ledger for a different destination");
                ResumeLedger::new(url, total)
            }
            None => ResumeLedger::new(url, total),
        };

        let start = match self.resume_point(&job, &mut ledger).await? {
            RemoteState::Complete => {
                debug!(id = %job.id, "destination already holds the full object");
                return self.finish(job.id, total, on_progress);
            }
            RemoteState::Partial(offset) => offset,
        };

        if total == 0 {
            let req = self
                .request(job.destination, "bytes */0".into())
                .header(CONTENT_TYPE, job.file.mime_type.as_str())
                .body(Vec::new());
            return match self.send(req).await? {
                RemoteState::Complete => self.finish(job.id, total, on_progress),
                RemoteState::Partial(acknowledged) => Err(TransferError::Incomplete { acknowledged, total }),
            };
        }

        let mut reader = ChunkReader::new(&job.file.data, job.chunk_size);
        reader.seek_to(start);
        if start > 0 {
            on_progress(ChunkProgress::new(start, total));
        }

        let mut acknowledged = start;
        while let Some(chunk) = reader.next_chunk() {
            let state = self
                .put_chunk(job.destination, &job.file.mime_type, &chunk, total)
                .await?;

            let end = match state {
                RemoteState::Complete => return self.finish(job.id, total, on_progress),
                RemoteState::Partial(held) => held.min(chunk.offset + chunk.data.len() as u64),
            };
            // The destination persisted nothing new; stop and let a retry
            // resume from whatever it reports then.
            if end <= chunk.offset {
                warn!(id = %job.id, offset = chunk.offset, held = end, "destination kept none of the chunk");
                return Err(TransferError::Incomplete { acknowledged: end, total });
            }

            let kept = &chunk.data[..(end - chunk.offset) as usize];
            let checksum = if kept.len() == chunk.data.len() {
                chunk.checksum
            } else {
                debug!(id = %job.id, offset = chunk.offset, kept = kept.len(), "destination kept part of the chunk");
                reader.seek_to(end);
                crate::checksum_bytes(kept)
            };
            ledger.record(chunk.offset, kept.len() as u64, checksum);
            ledger.save(self.cache.as_ref(), job.id)?;
            acknowledged = end;
            on_progress(ChunkProgress::new(end, total));
        }

        Err(TransferError::Incomplete { acknowledged, total })
    }

    fn finish(&self, id: &str, total: u64, on_progress: ProgressFn<'_>) -> Result<(), TransferError> {
        ResumeLedger::remove(self.cache.as_ref(), id)?;
        on_progress(ChunkProgress::new(total, total));
        debug!(id = %id, total, "transfer complete");
        Ok(())
    }
}

impl ChunkedTransport for ResumableHttpTransport {
    fn upload<'a>(
        &'a self,
        job: TransferJob<'a>,
        on_progress: ProgressFn<'a>,
        cancel: CancellationToken,
    ) -> TransferFuture<'a> {
        Box::pin(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(id = %job.id, "transfer cancelled");
                    Err(TransferError::Cancelled)
                }
                result = self.run(job, on_progress) => result,
            }
        })
    }
}

/// Parses `bytes=0-<last>` into the next offset to send.
fn parse_range(raw: &str) -> Result<u64, TransferError> {
    let bad = || TransferError::BadRange(raw.to_string());
    let bounds = raw.trim().strip_prefix("bytes=").ok_or_else(bad)?;
    let (_, last) = bounds.split_once('-').ok_or_else(bad)?;
    let last: u64 = last.trim().parse().map_err(|_| bad())?;
    Ok(last + 1)
}
