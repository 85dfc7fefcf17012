//! The persisted unit of work: one record per selected file.

use serde::{Deserialize, Serialize};

use darkroom_protocol::messages::{FileDescriptor, PendingFile, ResumableAnnouncement};
use darkroom_protocol::{Destination, FilePayload};

use crate::error::QueueError;

/// Credential state of a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum RecordStatus {
    /// Waiting for the issuer's verdict.
    PendingCredentials,
    /// Destination issued; ready to upload.
    Valid,
    /// Rejected by the issuer. Terminal until the user acts.
    Invalid { error: String },
}

impl RecordStatus {
    fn label(&self) -> &'static str {
        match self {
            RecordStatus::PendingCredentials => "pending-credentials",
            RecordStatus::Valid => "valid",
            RecordStatus::Invalid { .. } => "invalid",
        }
    }
}

/// One upload, as stored in the durable queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: String,
    pub file: FilePayload,
    pub group_id: String,
    #[serde(default)]
    pub container_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Destination>,
    pub status: RecordStatus,
}

impl UploadRecord {
    /// Creates a record awaiting credentials.
    pub fn new(
        id: impl Into<String>,
        file: FilePayload,
        group_id: impl Into<String>,
        container_id: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            file,
            group_id: group_id.into(),
            container_id,
            destination: None,
            status: RecordStatus::PendingCredentials,
        }
    }

    /// Marks the record valid with its signed destination.
    ///
    /// Fails if the record was already resolved; a verdict never reverts.
    pub fn resolve_valid(&mut self, destination: Destination) -> Result<(), QueueError> {
        self.ensure_pending()?;
        self.destination = Some(destination);
        self.status = RecordStatus::Valid;
        Ok(())
    }

    /// Marks the record rejected with the issuer's reason.
    pub fn resolve_invalid(&mut self, error: impl Into<String>) -> Result<(), QueueError> {
        self.ensure_pending()?;
        self.destination = None;
        self.status = RecordStatus::Invalid {
            error: error.into(),
        };
        Ok(())
    }

    fn ensure_pending(&self) -> Result<(), QueueError> {
        match self.status {
            RecordStatus::PendingCredentials => Ok(()),
            ref other => Err(QueueError::InvalidTransition {
                id: self.id.clone(),
                status: other.label(),
            }),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.status == RecordStatus::Valid && self.destination.is_some()
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self.status, RecordStatus::Invalid { .. })
    }

    /// Rejection reason, if any.
    pub fn error(&self) -> Option<&str> {
        match &self.status {
            RecordStatus::Invalid { error } => Some(error),
            _ => None,
        }
    }

    /// Metadata-only description sent to the issuer.
    pub fn descriptor(&self) -> FileDescriptor {
        FileDescriptor::describe(&self.id, &self.file)
    }

    pub fn resumable_announcement(&self) -> ResumableAnnouncement {
        ResumableAnnouncement {
            id: self.id.clone(),
            name: self.file.name.clone(),
            group_id: self.group_id.clone(),
            mime_type: self.file.mime_type.clone(),
            size: self.file.size,
        }
    }

    pub fn pending_file(&self) -> PendingFile {
        PendingFile {
            id: self.id.clone(),
            size: self.file.size,
            mime_type: self.file.mime_type.clone(),
            name: self.file.name.clone(),
            error: self.error().map(str::to_string),
        }
    }
}

/// Splits the records of `group_id` into `(valid, invalid)`.
///
/// Order is preserved; records of other groups and records still awaiting
/// credentials are dropped.
pub fn partition_group(
    records: Vec<UploadRecord>,
    group_id: &str,
) -> (Vec<UploadRecord>, Vec<UploadRecord>) {
    let mut valid = Vec::new();
    let mut invalid = Vec::new();
    for record in records.into_iter().filter(|r| r.group_id == group_id) {
        if record.is_valid() {
            valid.push(record);
        } else if record.is_invalid() {
            invalid.push(record);
        }
    }
    (valid, invalid)
}
