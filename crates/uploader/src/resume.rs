//! Resume-on-reconnect.
//!
//! [`ConnectivityMachine`] turns raw online/offline signals into at most
//! one action per real change. [`resume`] rebuilds the pending-work set
//! from the durable queue and restarts the drain.

use tracing::{debug, info};

use darkroom_protocol::constants::EventType;
use darkroom_protocol::messages::{AlbumsAnnouncement, PendingPhotosAnnouncement};
use darkroom_queue::{load_folder_albums, partition_group};

use crate::channel::push_typed;
use crate::error::UploadError;
use crate::pool::run_drain;
use crate::session::UploadSession;
use crate::types::DrainSummary;

/// Network reachability as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
    Offline,
    Online,
}

/// Action declared for a connectivity change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Offline → Online`: rebuild work from the queue and drain it.
    Resume,
    /// `Online → Offline`: stop in-flight transports, keep records.
    Pause,
}

/// Debounces connectivity signals into [`Transition`]s.
#[derive(Debug, Clone)]
pub struct ConnectivityMachine {
    state: Connectivity,
}

impl ConnectivityMachine {
    pub fn new(initial: Connectivity) -> Self {
        Self { state: initial }
    }

    pub fn state(&self) -> Connectivity {
        self.state
    }

    /// Applies a signal. Repeating the current state yields nothing.
    pub fn apply(&mut self, signal: Connectivity) -> Option<Transition> {
        let transition = match (self.state, signal) {
            (Connectivity::Offline, Connectivity::Online) => Some(Transition::Resume),
            (Connectivity::Online, Connectivity::Offline) => Some(Transition::Pause),
            _ => None,
        };
        self.state = signal;
        transition
    }
}

/// What a resume found and did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumeSummary {
    /// Valid records announced and drained.
    pub resumed: usize,
    /// Rejected records reported back to the page.
    pub pending: usize,
    pub drain: DrainSummary,
}

/// Rebuilds pending work from the queue and drains it.
///
/// Announces each valid record (`add_resumeable_photos`) and the cached
/// album mapping (`add_albums`), reports rejected records in a single
/// `pending_photos`, then drains the valid ones. Returns once the drain
/// finishes or is paused. Lifts an earlier [`pause`].
pub async fn resume(session: &UploadSession) -> Result<ResumeSummary, UploadError> {
    session.ensure_open()?;
    session.unpause();
    let _guard = session.drain_guard().await;

    let records = session.queue().get_all().await?;
    let (valid, invalid) = partition_group(records, session.group_id());
    let channel = session.channel();

    let mut summary = ResumeSummary {
        resumed: valid.len(),
        pending: invalid.len(),
        ..Default::default()
    };

    if !valid.is_empty() {
        for record in &valid {
            push_typed(channel, EventType::AddResumeablePhotos, &record.resumable_announcement()).await?;
        }
        let albums = load_folder_albums(session.cache(), session.group_id())?
            .map(|a| a.albums)
            .unwrap_or_default();
        push_typed(channel, EventType::AddAlbums, &AlbumsAnnouncement { albums }).await?;
    }

    if !invalid.is_empty() {
        let announcement = PendingPhotosAnnouncement {
            files: invalid.iter().map(|r| r.pending_file()).collect(),
            group_id: session.group_id().to_string(),
        };
        push_typed(channel, EventType::PendingPhotos, &announcement).await?;
    }

    if valid.is_empty() {
        debug!(group = %session.group_id(), pending = summary.pending, "nothing to resume");
        return Ok(summary);
    }

    info!(group = %session.group_id(), uploads = summary.resumed, "resuming uploads");
    summary.drain = run_drain(session, valid).await?;
    Ok(summary)
}

/// Stops in-flight transports without touching the queue. Drains started
/// before the next [`resume`] stop before uploading anything.
pub fn pause(session: &UploadSession) {
    session.pause();
}
