//! Upload session: the explicit context every flow runs against.
//!
//! A session binds one gallery to its collaborators (queue, cache, live
//! channel, transport) and owns the cancellation tree: a root token for
//! the whole session, one token per drain run, and one per in-flight
//! record.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use darkroom_queue::{DurableQueue, LocalCache};
use darkroom_transfer::ChunkedTransport;

use crate::channel::LiveChannel;
use crate::error::UploadError;
use crate::folder::FolderSelection;
use crate::types::{UploadConfig, UploadEvent};

/// Collaborators an [`UploadSession`] drives.
#[derive(Clone)]
pub struct Backends {
    pub queue: Arc<dyn DurableQueue>,
    pub cache: Arc<dyn LocalCache>,
    pub channel: Arc<dyn LiveChannel>,
    pub transport: Arc<dyn ChunkedTransport>,
}

struct SessionInner {
    group_id: String,
    default_album: Option<String>,
    config: UploadConfig,
    backends: Backends,
    // Created by `take_events`; until then events are dropped.
    events_tx: Mutex<Option<mpsc::Sender<UploadEvent>>>,
    root: CancellationToken,
    run: Mutex<Option<CancellationToken>>,
    // Set by `pause`, cleared by `resume`. Runs started meanwhile begin cancelled.
    paused: AtomicBool,
    active: Mutex<HashMap<String, CancellationToken>>,
    drain_lock: tokio::sync::Mutex<()>,
    folder: Mutex<Option<FolderSelection>>,
}

const EVENT_BUFFER: usize = 256;

/// Upload context for one gallery. Cheap to clone.
#[derive(Clone)]
pub struct UploadSession {
    inner: Arc<SessionInner>,
}

// Poisoning only happens if a holder panicked; the maps stay usable.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl UploadSession {
    pub fn new(
        group_id: impl Into<String>,
        default_album: Option<String>,
        backends: Backends,
        config: UploadConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                group_id: group_id.into(),
                default_album,
                config: config.normalized(),
                backends,
                events_tx: Mutex::new(None),
                root: CancellationToken::new(),
                run: Mutex::new(None),
                paused: AtomicBool::new(false),
                active: Mutex::new(HashMap::new()),
                drain_lock: tokio::sync::Mutex::new(()),
                folder: Mutex::new(None),
            }),
        }
    }

    /// Takes the event receiver. Can only be called once, and not after
    /// [`close`](Self::close).
    ///
    /// Events emitted before this call are not delivered. Once taken, the
    /// receiver must be drained: a full channel holds the emitting drain.
    pub fn take_events(&self) -> Option<mpsc::Receiver<UploadEvent>> {
        let mut tx = lock(&self.inner.events_tx);
        if tx.is_some() || self.is_closed() {
            return None;
        }
        let (sender, rx) = mpsc::channel(EVENT_BUFFER);
        *tx = Some(sender);
        Some(rx)
    }

    pub fn group_id(&self) -> &str {
        &self.inner.group_id
    }

    /// Album used when the folder mapping has no match.
    pub fn default_album(&self) -> Option<&str> {
        self.inner.default_album.as_deref()
    }

    pub fn config(&self) -> &UploadConfig {
        &self.inner.config
    }

    pub fn queue(&self) -> &dyn DurableQueue {
        self.inner.backends.queue.as_ref()
    }

    pub fn cache(&self) -> &dyn LocalCache {
        self.inner.backends.cache.as_ref()
    }

    pub fn channel(&self) -> &dyn LiveChannel {
        self.inner.backends.channel.as_ref()
    }

    pub fn transport(&self) -> &dyn ChunkedTransport {
        self.inner.backends.transport.as_ref()
    }

    pub(crate) async fn emit(&self, event: UploadEvent) {
        let tx = lock(&self.inner.events_tx).clone();
        if let Some(tx) = tx {
            let _ = tx.send(event).await;
        }
    }

    // -----------------------------------------------------------------------
    // Cancellation
    // -----------------------------------------------------------------------

    pub fn is_closed(&self) -> bool {
        self.inner.root.is_cancelled()
    }

    pub(crate) fn ensure_open(&self) -> Result<(), UploadError> {
        if self.is_closed() {
            Err(UploadError::Closed)
        } else {
            Ok(())
        }
    }

    /// Serializes drains so a record is never in two pools at once.
    pub(crate) async fn drain_guard(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.drain_lock.lock().await
    }

    /// Starts a drain run and returns its token. While paused the token
    /// comes back already cancelled, so the drain stops before any upload.
    pub(crate) fn begin_run(&self) -> Result<CancellationToken, UploadError> {
        self.ensure_open()?;
        let token = self.inner.root.child_token();
        if self.is_paused() {
            debug!(group = %self.inner.group_id, "drain requested while paused");
            token.cancel();
        }
        *lock(&self.inner.run) = Some(token.clone());
        Ok(token)
    }

    pub(crate) fn end_run(&self) {
        lock(&self.inner.run).take();
    }

    /// Stops the current drain and holds off new ones until
    /// [`unpause`](Self::unpause). In-flight transports are cancelled and
    /// their records stay queued for the next resume.
    pub fn pause(&self) {
        let was_paused = self.inner.paused.swap(true, Ordering::SeqCst);
        let run = lock(&self.inner.run).take();
        if let Some(run) = &run {
            run.cancel();
        }
        if !was_paused || run.is_some() {
            info!(group = %self.inner.group_id, "uploads paused");
        }
    }

    pub(crate) fn unpause(&self) {
        if self.inner.paused.swap(false, Ordering::SeqCst) {
            debug!(group = %self.inner.group_id, "uploads unpaused");
        }
    }

    pub fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::SeqCst)
    }

    /// Registers an upload as in flight under `run`.
    pub(crate) fn register(&self, id: &str, run: &CancellationToken) -> CancellationToken {
        let token = run.child_token();
        lock(&self.inner.active).insert(id.to_string(), token.clone());
        token
    }

    pub(crate) fn unregister(&self, id: &str) {
        lock(&self.inner.active).remove(id);
    }

    /// Stops one in-flight upload. Returns whether it was running.
    pub fn abort(&self, id: &str) -> bool {
        match lock(&self.inner.active).remove(id) {
            Some(token) => {
                token.cancel();
                debug!(id = %id, "upload aborted");
                true
            }
            None => false,
        }
    }

    /// Cancels every in-flight upload and returns their ids, sorted.
    pub(crate) fn cancel_active(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.active)
            .drain()
            .map(|(id, token)| {
                token.cancel();
                id
            })
            .collect();
        ids.sort();
        ids
    }

    pub fn active_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.inner.active).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Tears the session down. Pending work stays in the queue.
    pub fn close(&self) {
        self.inner.root.cancel();
        lock(&self.inner.active).clear();
        lock(&self.inner.run).take();
        lock(&self.inner.folder).take();
        // Dropping the sender ends the consumer once in-flight emits finish.
        lock(&self.inner.events_tx).take();
        info!(group = %self.inner.group_id, "upload session closed");
    }

    // -----------------------------------------------------------------------
    // Folder selection
    // -----------------------------------------------------------------------

    pub(crate) fn set_folder_selection(&self, selection: FolderSelection) {
        *lock(&self.inner.folder) = Some(selection);
    }

    pub(crate) fn take_folder_selection(&self) -> Option<FolderSelection> {
        lock(&self.inner.folder).take()
    }
}
