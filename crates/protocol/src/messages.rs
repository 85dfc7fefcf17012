use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::types::{AlbumRef, Destination, FilePayload};

// ---------------------------------------------------------------------------
// Handshake
// ---------------------------------------------------------------------------

/// First message on a new connection: binds it to one gallery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinRequest {
    pub group_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub token: String,
}

/// Server acknowledgement of a join.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JoinReply {
    pub group_id: String,
}

// ---------------------------------------------------------------------------
// Credential batch
// ---------------------------------------------------------------------------

/// Lightweight description of one file, sent instead of the bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub id: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub name: String,
}

impl FileDescriptor {
    /// Describes `file` under the given identifier.
    pub fn describe(id: impl Into<String>, file: &FilePayload) -> Self {
        Self {
            id: id.into(),
            size: file.size,
            mime_type: file.mime_type.clone(),
            name: file.name.clone(),
        }
    }
}

/// `get_signed_url` request: one round-trip for the whole selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedUrlRequest {
    pub files: Vec<FileDescriptor>,
    pub group_id: String,
}

/// Issuer verdict for a rejected file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidMarker {
    pub error: String,
}

/// `get_signed_url` reply, keyed by file id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignedUrlReply {
    #[serde(default)]
    pub urls: HashMap<String, Destination>,
    #[serde(default)]
    pub invalid: HashMap<String, InvalidMarker>,
}

// ---------------------------------------------------------------------------
// Transfer notifications
// ---------------------------------------------------------------------------

/// `photo_done` request, sent once a transport has finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoDoneRequest {
    pub id: String,
    pub name: String,
    pub album_id: Option<String>,
}

/// `progress_custom` event, sent after every chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: String,
    /// Index of the batch this upload belongs to.
    pub current_chunk: usize,
    /// Number of batches in the current drain.
    pub chunk_length: usize,
    /// Percent complete, 0–100.
    pub progress: u8,
    pub name: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub group_id: String,
}

// ---------------------------------------------------------------------------
// Page notifications
// ---------------------------------------------------------------------------

/// `add_resumeable_photos`: a queued upload is being resumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumableAnnouncement {
    pub id: String,
    pub name: String,
    pub group_id: String,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub size: u64,
}

/// One rejected upload, as listed in `pending_photos`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingFile {
    pub id: String,
    pub size: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
    pub name: String,
    pub error: Option<String>,
}

/// `pending_photos`: uploads the issuer rejected, awaiting user action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingPhotosAnnouncement {
    pub files: Vec<PendingFile>,
    pub group_id: String,
}

/// `add_albums`: album mapping restored from the local cache.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlbumsAnnouncement {
    pub albums: BTreeMap<String, AlbumRef>,
}

/// `processing_message`: toggles the "preparing upload" indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingMessage {
    pub show: bool,
}

/// `folder-information`: result of a folder scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FolderInformation {
    pub folder: String,
    pub sub_folders: Vec<String>,
}

/// `remove-uploading`: uploads that were cancelled and dropped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RemoveUploading {
    #[serde(default)]
    pub ids: Vec<String>,
}

// ---------------------------------------------------------------------------
// Server pushes
// ---------------------------------------------------------------------------

/// `resume_pending_photos`: rejected uploads the server now accepts for retry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResumePendingPhotos {
    #[serde(default)]
    pub photos: HashMap<String, serde_json::Value>,
}

/// Photo reference used by `delete_pending_photos`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhotoRef {
    pub uuid: String,
}

/// `delete_pending_photos`: drop one or all rejected uploads.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeletePendingPhotos {
    #[serde(default)]
    pub delete_all: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo: Option<PhotoRef>,
}

/// `upload-photos`: confirms a scanned folder selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadPhotos {
    #[serde(default)]
    pub include_subfolders: bool,
}
