//! Entry points: a user selection and the server's pushes.

use std::collections::HashSet;

use tracing::{debug, info, warn};

use darkroom_protocol::FolderAlbums;
use darkroom_protocol::constants::EventType;
use darkroom_protocol::envelope::Message;
use darkroom_protocol::messages::{
    DeletePendingPhotos, PendingFile, RemoveUploading, ResumePendingPhotos, UploadPhotos,
};
use darkroom_queue::{UploadRecord, partition_group, save_folder_albums};

use crate::channel::push_typed;
use crate::credentials::{CredentialOutcome, acquire_credentials};
use crate::error::UploadError;
use crate::identify::{PendingUpload, assign_identifiers};
use crate::pool::drain;
use crate::session::UploadSession;
use crate::types::{DrainSummary, SelectedFile};

/// Outcome of a selection: the credential verdicts and the drain.
#[derive(Debug, Default)]
pub struct UploadReport {
    /// Ids that received a destination.
    pub accepted: Vec<String>,
    /// Uploads the server rejected, with its reasons.
    pub rejected: Vec<PendingFile>,
    /// Uploads the reply did not mention. Not persisted.
    pub unresolved: Vec<PendingUpload>,
    /// Ids that could not be written to the queue.
    pub unpersisted: Vec<String>,
    pub drain: DrainSummary,
}

/// Identifies, signs, persists and uploads a selection.
pub async fn start_upload(session: &UploadSession, files: Vec<SelectedFile>) -> Result<UploadReport, UploadError> {
    let pending = assign_identifiers(files);
    upload_pending(session, pending).await
}

async fn upload_pending(session: &UploadSession, pending: Vec<PendingUpload>) -> Result<UploadReport, UploadError> {
    let CredentialOutcome {
        valid,
        invalid,
        unresolved,
        unpersisted,
    } = acquire_credentials(session, pending).await?;
    if !unresolved.is_empty() {
        warn!(count = unresolved.len(), "server returned no verdict for some files");
    }

    let accepted = valid.iter().map(|r| r.id.clone()).collect();
    let drain = drain(session, valid).await?;
    Ok(UploadReport {
        accepted,
        rejected: invalid.iter().map(UploadRecord::pending_file).collect(),
        unresolved,
        unpersisted,
        drain,
    })
}

/// Re-requests credentials for rejected uploads the server now accepts.
///
/// Only rejected records of this gallery listed in `photos` are retried;
/// they keep their ids. Records are overwritten in place by the new
/// verdict, so a failed round-trip leaves them queued as they were.
pub async fn retry_pending(session: &UploadSession, request: ResumePendingPhotos) -> Result<UploadReport, UploadError> {
    session.ensure_open()?;
    let wanted: HashSet<&str> = request
        .photos
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, _)| k.as_str())
        .collect();

    let (_, invalid) = partition_group(session.queue().get_all().await?, session.group_id());
    let pending: Vec<PendingUpload> = invalid
        .into_iter()
        .filter(|r| wanted.contains(r.id.as_str()))
        .map(PendingUpload::from_record)
        .collect();

    info!(count = pending.len(), "retrying rejected uploads");
    upload_pending(session, pending).await
}

/// Which rejected uploads to discard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteScope {
    All,
    One(String),
}

impl From<DeletePendingPhotos> for DeleteScope {
    fn from(msg: DeletePendingPhotos) -> Self {
        match msg.photo {
            Some(photo) if !msg.delete_all => DeleteScope::One(photo.uuid),
            _ => DeleteScope::All,
        }
    }
}

/// Drops rejected uploads from the queue. Returns the deleted ids.
pub async fn delete_pending(session: &UploadSession, scope: DeleteScope) -> Result<Vec<String>, UploadError> {
    let ids: Vec<String> = match scope {
        DeleteScope::All => {
            let (_, invalid) = partition_group(session.queue().get_all().await?, session.group_id());
            invalid.into_iter().map(|r| r.id).collect()
        }
        DeleteScope::One(id) => vec![id],
    };
    for id in &ids {
        session.queue().delete(id.clone()).await?;
    }
    debug!(count = ids.len(), "discarded pending uploads");
    Ok(ids)
}

/// Cancels every in-flight upload, drops its record and tells the page.
pub async fn remove_uploading(session: &UploadSession) -> Result<Vec<String>, UploadError> {
    let ids = session.cancel_active();
    for id in &ids {
        session.queue().delete(id.clone()).await?;
    }
    push_typed(session.channel(), EventType::RemoveUploading, &RemoveUploading { ids: ids.clone() }).await?;
    info!(count = ids.len(), "removed in-flight uploads");
    Ok(ids)
}

/// Caches the server's folder/album mapping for this gallery.
pub fn store_folder_albums(session: &UploadSession, albums: &FolderAlbums) -> Result<(), UploadError> {
    save_folder_albums(session.cache(), session.group_id(), albums)?;
    debug!(albums = albums.albums.len(), "stored folder albums");
    Ok(())
}

/// Uploads the last scanned folder once the server confirms it.
pub async fn upload_photos(session: &UploadSession, request: UploadPhotos) -> Result<UploadReport, UploadError> {
    let Some(selection) = session.take_folder_selection() else {
        warn!("upload-photos without a scanned folder");
        return Ok(UploadReport::default());
    };
    let files = selection.into_upload(request.include_subfolders).await?;
    if files.is_empty() {
        debug!("folder selection has no uploadable files");
        return Ok(UploadReport::default());
    }
    start_upload(session, files).await
}

/// Dispatches one server push.
pub async fn handle_push(session: &UploadSession, event: EventType, message: &Message) -> Result<(), UploadError> {
    match event {
        EventType::ResumePendingPhotos => {
            let request: ResumePendingPhotos = message.parse_payload()?.unwrap_or_default();
            retry_pending(session, request).await?;
        }
        EventType::DeletePendingPhotos => {
            let request: DeletePendingPhotos = message.parse_payload()?.unwrap_or_default();
            delete_pending(session, request.into()).await?;
        }
        EventType::RemoveUploading => {
            remove_uploading(session).await?;
        }
        EventType::FolderAlbums => {
            let albums: FolderAlbums = message.parse_payload()?.unwrap_or_default();
            store_folder_albums(session, &albums)?;
        }
        EventType::UploadPhotos => {
            let request: UploadPhotos = message.parse_payload()?.unwrap_or_default();
            upload_photos(session, request).await?;
        }
        other => debug!(event = ?other, "ignoring push"),
    }
    Ok(())
}

/// This gallery's queued records, split into `(valid, invalid)`.
pub async fn queued(session: &UploadSession) -> Result<(Vec<UploadRecord>, Vec<UploadRecord>), UploadError> {
    Ok(partition_group(session.queue().get_all().await?, session.group_id()))
}
