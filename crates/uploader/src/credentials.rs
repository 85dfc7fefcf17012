//! Batch credential acquisition.
//!
//! One `get_signed_url` round-trip covers the whole selection. Each
//! verdict is persisted as soon as it is known; nothing is persisted if
//! the round-trip itself fails.

use tracing::{debug, error, warn};

use darkroom_protocol::constants::EventType;
use darkroom_protocol::messages::{ProcessingMessage, SignedUrlReply, SignedUrlRequest};
use darkroom_queue::{UploadRecord, load_folder_albums};

use crate::channel::{push_typed, request_typed};
use crate::error::UploadError;
use crate::folder::resolve_container;
use crate::identify::PendingUpload;
use crate::session::UploadSession;

/// Result of one credential round-trip.
#[derive(Debug, Default)]
pub struct CredentialOutcome {
    /// Persisted with a destination, ready to upload.
    pub valid: Vec<UploadRecord>,
    /// Persisted with the issuer's rejection.
    pub invalid: Vec<UploadRecord>,
    /// Absent from the reply; not persisted.
    pub unresolved: Vec<PendingUpload>,
    /// Resolved but could not be written to the queue. These still upload
    /// in this session but will not survive a restart.
    pub unpersisted: Vec<String>,
}

/// Requests destinations for `pending` and persists the verdicts.
pub async fn acquire_credentials(
    session: &UploadSession,
    pending: Vec<PendingUpload>,
) -> Result<CredentialOutcome, UploadError> {
    session.ensure_open()?;
    if pending.is_empty() {
        return Ok(CredentialOutcome::default());
    }

    let request = SignedUrlRequest {
        files: pending.iter().map(PendingUpload::descriptor).collect(),
        group_id: session.group_id().to_string(),
    };

    push_typed(session.channel(), EventType::ProcessingMessage, &ProcessingMessage { show: true }).await?;
    let result = request_typed(session.channel(), EventType::GetSignedUrl, &request).await;
    if let Err(e) = push_typed(session.channel(), EventType::ProcessingMessage, &ProcessingMessage { show: false }).await {
        debug!(error = %e, "could not clear processing message");
    }

    let reply: SignedUrlReply = result?
        .parse_payload()?
        .ok_or_else(|| UploadError::Reply("empty get_signed_url reply".into()))?;

    let albums = match load_folder_albums(session.cache(), session.group_id()) {
        Ok(albums) => albums,
        Err(e) => {
            warn!(error = %e, "ignoring unreadable folder album mapping");
            None
        }
    };

    let mut outcome = CredentialOutcome::default();
    for upload in pending {
        let verdict = if let Some(dest) = reply.urls.get(&upload.id) {
            Ok(dest.clone())
        } else if let Some(marker) = reply.invalid.get(&upload.id) {
            Err(marker.error.clone())
        } else {
            outcome.unresolved.push(upload);
            continue;
        };

        let container = resolve_container(&upload.file.name, albums.as_ref(), session.default_album());
        let mut record = UploadRecord::new(upload.id, upload.file, session.group_id(), container);
        match verdict {
            Ok(dest) => record.resolve_valid(dest)?,
            Err(reason) => record.resolve_invalid(reason)?,
        }

        if let Err(e) = session.queue().put(record.clone()).await {
            error!(id = %record.id, error = %e, "failed to persist upload record; it will not resume after a restart");
            outcome.unpersisted.push(record.id.clone());
        }

        if record.is_valid() {
            outcome.valid.push(record);
        } else {
            outcome.invalid.push(record);
        }
    }

    debug!(
        valid = outcome.valid.len(),
        invalid = outcome.invalid.len(),
        unresolved = outcome.unresolved.len(),
        "credentials acquired"
    );
    Ok(outcome)
}
