//! Bounded worker pool and the queue drain.
//!
//! [`WorkerPool`] runs at most `concurrency` jobs at once. [`drain`] feeds
//! it one batch at a time and only moves to the next batch once the pool
//! is idle, so batch boundaries are observed exactly once and in order.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use darkroom_protocol::constants::EventType;
use darkroom_protocol::messages::{PhotoDoneRequest, ProgressEvent};
use darkroom_queue::{UploadRecord, clear_folder_albums};
use darkroom_transfer::{ChunkProgress, TransferError, TransferJob};

use crate::channel::{push_typed, request_typed};
use crate::error::UploadError;
use crate::session::UploadSession;
use crate::types::{DrainSummary, UploadEvent};

// ---------------------------------------------------------------------------
// WorkerPool
// ---------------------------------------------------------------------------

/// Fixed-size pool of async jobs.
pub struct WorkerPool<T> {
    permits: Arc<Semaphore>,
    tasks: JoinSet<T>,
    finished: Vec<T>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(concurrency: usize) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            tasks: JoinSet::new(),
            finished: Vec::new(),
        }
    }

    /// Waits for a free slot, then starts `job`.
    ///
    /// Jobs start in submission order.
    pub async fn submit<F>(&mut self, job: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return;
        };
        self.tasks.spawn(async move {
            let _permit = permit;
            job.await
        });
        self.reap();
    }

    /// Number of jobs not yet collected.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits until every submitted job has finished and returns their
    /// outputs, in completion order.
    pub async fn wait_idle(&mut self) -> Vec<T> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(output) => self.finished.push(output),
                Err(e) => warn!(error = %e, "upload task panicked"),
            }
        }
        std::mem::take(&mut self.finished)
    }

    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next() {
            match joined {
                Ok(output) => self.finished.push(output),
                Err(e) => warn!(error = %e, "upload task panicked"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Drain
// ---------------------------------------------------------------------------

/// How one upload ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum JobOutcome {
    Completed,
    Failed,
    Cancelled,
}

/// Where an upload sits in the drain, for `progress_custom`.
#[derive(Debug, Clone, Copy)]
struct BatchPosition {
    index: usize,
    count: usize,
}

/// Uploads `records` in batches through the worker pool.
///
/// Records that are not valid are skipped. Waits for any drain already
/// running on this session to finish first.
pub async fn drain(session: &UploadSession, records: Vec<UploadRecord>) -> Result<DrainSummary, UploadError> {
    let _guard = session.drain_guard().await;
    run_drain(session, records).await
}

/// [`drain`] body. The caller must hold the session's drain guard.
pub(crate) async fn run_drain(
    session: &UploadSession,
    records: Vec<UploadRecord>,
) -> Result<DrainSummary, UploadError> {
    let run = session.begin_run()?;
    let config = session.config().clone();

    let records: Vec<UploadRecord> = records.into_iter().filter(UploadRecord::is_valid).collect();
    let batches: Vec<Vec<UploadRecord>> = records
        .chunks(config.batch_size)
        .map(<[UploadRecord]>::to_vec)
        .collect();
    let count = batches.len();

    let mut summary = DrainSummary::default();
    let mut pool = WorkerPool::new(config.concurrency);

    info!(group = %session.group_id(), uploads = records.len(), batches = count, "draining upload queue");

    for (index, batch) in batches.into_iter().enumerate() {
        if run.is_cancelled() {
            break;
        }
        debug!(index, count, size = batch.len(), "starting batch");
        session
            .emit(UploadEvent::BatchStarted {
                index,
                count,
                size: batch.len(),
            })
            .await;
        summary.batches += 1;

        let position = BatchPosition { index, count };
        for record in batch {
            if run.is_cancelled() {
                break;
            }
            let cancel = session.register(&record.id, &run);
            let session = session.clone();
            pool.submit(upload_one(session, record, position, cancel)).await;
        }

        for outcome in pool.wait_idle().await {
            match outcome {
                JobOutcome::Completed => summary.completed += 1,
                JobOutcome::Failed => summary.failed += 1,
                JobOutcome::Cancelled => summary.cancelled += 1,
            }
        }
    }

    summary.paused = run.is_cancelled();
    if summary.paused {
        info!(group = %session.group_id(), started = summary.batches, count, "drain paused");
    } else {
        if let Err(e) = clear_folder_albums(session.cache(), session.group_id()) {
            warn!(error = %e, "could not clear folder album mapping");
        }
        info!(
            group = %session.group_id(),
            completed = summary.completed,
            failed = summary.failed,
            "drain finished"
        );
    }
    session.end_run();
    Ok(summary)
}

/// Transfers one record, confirms it, and only then drops it.
async fn upload_one(
    session: UploadSession,
    record: UploadRecord,
    position: BatchPosition,
    cancel: CancellationToken,
) -> JobOutcome {
    let outcome = transfer_and_confirm(&session, &record, position, cancel).await;
    session.unregister(&record.id);
    outcome
}

async fn transfer_and_confirm(
    session: &UploadSession,
    record: &UploadRecord,
    position: BatchPosition,
    cancel: CancellationToken,
) -> JobOutcome {
    let Some(destination) = record.destination.as_ref() else {
        return JobOutcome::Failed;
    };
    let job = TransferJob {
        id: &record.id,
        file: &record.file,
        destination,
        chunk_size: session.config().chunk_size,
    };

    let (progress_tx, progress_rx) = mpsc::unbounded_channel::<ChunkProgress>();
    let transfer = async move {
        let on_progress = move |p: ChunkProgress| {
            let _ = progress_tx.send(p);
        };
        session.transport().upload(job, &on_progress, cancel).await
    };
    let (result, ()) = tokio::join!(transfer, forward_progress(session, record, position, progress_rx));

    match result {
        Ok(()) => confirm(session, record).await,
        Err(TransferError::Cancelled) => {
            debug!(id = %record.id, "upload cancelled");
            JobOutcome::Cancelled
        }
        Err(e) => {
            warn!(id = %record.id, name = %record.file.name, error = %e, "upload failed");
            session
                .emit(UploadEvent::Failed {
                    id: record.id.clone(),
                    error: e.to_string(),
                })
                .await;
            JobOutcome::Failed
        }
    }
}

/// Relays chunk progress to the page until the transport finishes.
async fn forward_progress(
    session: &UploadSession,
    record: &UploadRecord,
    position: BatchPosition,
    mut progress_rx: mpsc::UnboundedReceiver<ChunkProgress>,
) {
    while let Some(p) = progress_rx.recv().await {
        let percent = p.percent();
        session
            .emit(UploadEvent::Progress {
                id: record.id.clone(),
                percent,
                uploaded_bytes: p.uploaded_bytes,
                total_bytes: p.total_bytes,
            })
            .await;

        let event = ProgressEvent {
            id: record.id.clone(),
            current_chunk: position.index,
            chunk_length: position.count,
            progress: percent,
            name: record.file.name.clone(),
            size: record.file.size,
            mime_type: record.file.mime_type.clone(),
            group_id: record.group_id.clone(),
        };
        if let Err(e) = push_typed(session.channel(), EventType::ProgressCustom, &event).await {
            debug!(id = %record.id, error = %e, "dropped progress update");
        }
    }
}

/// Sends `photo_done` and deletes the record once the server answers.
async fn confirm(session: &UploadSession, record: &UploadRecord) -> JobOutcome {
    let request = PhotoDoneRequest {
        id: record.id.clone(),
        name: record.file.name.clone(),
        album_id: record.container_id.clone(),
    };

    if let Err(e) = request_typed(session.channel(), EventType::PhotoDone, &request).await {
        warn!(id = %record.id, error = %e, "completion not confirmed, keeping record");
        session
            .emit(UploadEvent::Failed {
                id: record.id.clone(),
                error: format!("completion not confirmed: {e}"),
            })
            .await;
        return JobOutcome::Failed;
    }

    if let Err(e) = session.queue().delete(record.id.clone()).await {
        error!(id = %record.id, error = %e, "failed to drop confirmed record");
    }
    debug!(id = %record.id, "upload confirmed");
    session
        .emit(UploadEvent::Completed {
            id: record.id.clone(),
        })
        .await;
    JobOutcome::Completed
}
