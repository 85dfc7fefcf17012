//! In-memory collaborators shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use darkroom_protocol::constants::EventType;
use darkroom_protocol::envelope::Message;
use darkroom_protocol::messages::{InvalidMarker, SignedUrlReply, SignedUrlRequest};
use darkroom_protocol::{Destination, FilePayload};
use darkroom_queue::{DurableQueue, MemoryCache, MemoryQueue, UploadRecord};
use darkroom_transfer::{ChunkProgress, ChunkedTransport, ProgressFn, TransferError, TransferFuture, TransferJob};

use crate::channel::{ChannelFuture, LiveChannel};
use crate::error::UploadError;
use crate::session::{Backends, UploadSession};
use crate::types::{UploadConfig, UploadEvent};

pub(crate) const GROUP: &str = "g1";

// ---------------------------------------------------------------------------
// MockChannel
// ---------------------------------------------------------------------------

/// Fake server: signs every file unless told otherwise, confirms every
/// completion, and records all traffic.
#[derive(Default)]
pub(crate) struct MockChannel {
    pub requests: Mutex<Vec<(EventType, serde_json::Value)>>,
    pub pushes: Mutex<Vec<(EventType, serde_json::Value)>>,
    /// File name -> rejection reason.
    pub reject: Mutex<HashMap<String, String>>,
    /// File names left out of the reply entirely.
    pub omit: Mutex<HashSet<String>>,
    pub fail_signed_url: AtomicBool,
    pub fail_photo_done: AtomicBool,
}

impl MockChannel {
    pub fn reject(&self, name: &str, error: &str) {
        self.reject.lock().unwrap().insert(name.into(), error.into());
    }

    pub fn omit(&self, name: &str) {
        self.omit.lock().unwrap().insert(name.into());
    }

    pub fn requests_of(&self, event: EventType) -> Vec<serde_json::Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn pushes_of(&self, event: EventType) -> Vec<serde_json::Value> {
        self.pushes
            .lock()
            .unwrap()
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn push_events(&self) -> Vec<EventType> {
        self.pushes.lock().unwrap().iter().map(|(e, _)| e.clone()).collect()
    }

    fn sign(&self, payload: &serde_json::Value) -> Result<SignedUrlReply, UploadError> {
        let req: SignedUrlRequest = serde_json::from_value(payload.clone())?;
        let reject = self.reject.lock().unwrap();
        let omit = self.omit.lock().unwrap();
        let mut reply = SignedUrlReply::default();
        for file in req.files {
            if omit.contains(&file.name) {
                continue;
            }
            if let Some(error) = reject.get(&file.name) {
                reply.invalid.insert(file.id, InvalidMarker { error: error.clone() });
            } else {
                reply.urls.insert(file.id.clone(), destination(&file.id));
            }
        }
        Ok(reply)
    }
}

impl LiveChannel for MockChannel {
    fn request(&self, event: EventType, payload: &serde_json::Value) -> ChannelFuture<'_, Message> {
        self.requests.lock().unwrap().push((event.clone(), payload.clone()));
        let payload = payload.clone();

        Box::pin(async move {
            match event {
                EventType::GetSignedUrl => {
                    if self.fail_signed_url.load(Ordering::SeqCst) {
                        return Err(UploadError::Channel("request timed out".into()));
                    }
                    let reply = self.sign(&payload)?;
                    Ok(Message::new("reply", EventType::Reply, Some(&reply))?)
                }
                EventType::PhotoDone => {
                    if self.fail_photo_done.load(Ordering::SeqCst) {
                        return Err(UploadError::Channel("connection closed".into()));
                    }
                    Ok(Message::new("reply", EventType::Reply, Some(&serde_json::json!({})))?)
                }
                other => Err(UploadError::Channel(format!("unexpected request {other:?}"))),
            }
        })
    }

    fn push(&self, event: EventType, payload: &serde_json::Value) -> ChannelFuture<'_, ()> {
        self.pushes.lock().unwrap().push((event, payload.clone()));
        Box::pin(async { Ok(()) })
    }
}

pub(crate) fn destination(id: &str) -> Destination {
    Destination {
        url: format!("https://storage.test/{id}"),
        fields: Default::default(),
    }
}

// ---------------------------------------------------------------------------
// MockTransport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Step {
    Start(String),
    End(String),
}

/// Fake transport: reports two progress steps and succeeds, unless the
/// file name is listed in `fail` or `hang`.
#[derive(Default)]
pub(crate) struct MockTransport {
    pub log: Mutex<Vec<Step>>,
    pub uploaded: Mutex<Vec<String>>,
    pub fail: Mutex<HashSet<String>>,
    /// File names that block until cancelled.
    pub hang: Mutex<HashSet<String>>,
    pub delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn fail(&self, name: &str) {
        self.fail.lock().unwrap().insert(name.into());
    }

    pub fn hang(&self, name: &str) {
        self.hang.lock().unwrap().insert(name.into());
    }

    pub fn uploaded(&self) -> Vec<String> {
        self.uploaded.lock().unwrap().clone()
    }

    /// Waits until an upload with this id has started.
    pub async fn started(&self, id: &str) {
        loop {
            let seen = self
                .log
                .lock()
                .unwrap()
                .contains(&Step::Start(id.to_string()));
            if seen {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    async fn run(
        &self,
        job: TransferJob<'_>,
        on_progress: ProgressFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<(), TransferError> {
        let name = job.file.name.clone();
        if self.hang.lock().unwrap().contains(&name) {
            cancel.cancelled().await;
            return Err(TransferError::Cancelled);
        }
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransferError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
        if self.fail.lock().unwrap().contains(&name) {
            return Err(TransferError::Status {
                status: 503,
                body: "backend unavailable".into(),
            });
        }
        let total = job.file.size;
        on_progress(ChunkProgress::new(total / 2, total));
        on_progress(ChunkProgress::new(total, total));
        self.uploaded.lock().unwrap().push(job.id.to_string());
        Ok(())
    }
}

impl ChunkedTransport for MockTransport {
    fn upload<'a>(
        &'a self,
        job: TransferJob<'a>,
        on_progress: ProgressFn<'a>,
        cancel: CancellationToken,
    ) -> TransferFuture<'a> {
        Box::pin(async move {
            let id = job.id.to_string();
            self.log.lock().unwrap().push(Step::Start(id.clone()));
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let result = self.run(job, on_progress, &cancel).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.log.lock().unwrap().push(Step::End(id));
            result
        })
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub(crate) struct Harness {
    pub queue: Arc<dyn DurableQueue>,
    pub cache: Arc<MemoryCache>,
    pub channel: Arc<MockChannel>,
    pub transport: Arc<MockTransport>,
}

/// Session over an in-memory queue.
pub(crate) fn session_with(config: UploadConfig) -> (UploadSession, Harness) {
    session_on(Arc::new(MemoryQueue::new()), Arc::new(MemoryCache::new()), config)
}

/// Session over the given queue and cache, with fresh mocks.
pub(crate) fn session_on(
    queue: Arc<dyn DurableQueue>,
    cache: Arc<MemoryCache>,
    config: UploadConfig,
) -> (UploadSession, Harness) {
    let harness = Harness {
        queue,
        cache,
        channel: Arc::new(MockChannel::default()),
        transport: Arc::new(MockTransport::default()),
    };
    let backends = Backends {
        queue: harness.queue.clone(),
        cache: harness.cache.clone(),
        channel: harness.channel.clone(),
        transport: harness.transport.clone(),
    };
    let session = UploadSession::new(GROUP, Some("default-album".into()), backends, config);
    (session, harness)
}

pub(crate) fn payload(name: &str) -> FilePayload {
    let mime = if name.ends_with(".png") { "image/png" } else { "image/jpeg" };
    FilePayload::new(name, mime, name.as_bytes().to_vec())
}

pub(crate) fn valid_record(id: &str, name: &str) -> UploadRecord {
    let mut record = UploadRecord::new(id, payload(name), GROUP, None);
    record.resolve_valid(destination(id)).unwrap();
    record
}

pub(crate) fn invalid_record(id: &str, name: &str, error: &str) -> UploadRecord {
    let mut record = UploadRecord::new(id, payload(name), GROUP, None);
    record.resolve_invalid(error).unwrap();
    record
}

/// Collects whatever events are buffered right now.
pub(crate) fn buffered(rx: &mut mpsc::Receiver<UploadEvent>) -> Vec<UploadEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}
