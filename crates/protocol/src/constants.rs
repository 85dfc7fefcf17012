use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Size of one transport chunk in bytes (10 × 256 KiB).
///
/// Resumable storage endpoints require chunk sizes that are multiples of
/// 256 KiB, except for the final chunk.
pub const CHUNK_SIZE: usize = 262_144 * 10;

/// Number of transports allowed in flight at once.
pub const DEFAULT_CONCURRENCY: usize = 6;

/// Number of queued records submitted to the pool per batch.
pub const DEFAULT_BATCH_SIZE: usize = 5000;

/// Prefix of the local cache key holding a group's folder/album mapping.
pub const FOLDER_ALBUMS_PREFIX: &str = "folder_albums_";

/// Prefix of the local cache key holding a transport's resume ledger.
pub const UPLOAD_META_PREFIX: &str = "upload_meta_";

/// Returns the cache key for a group's folder/album mapping.
pub fn folder_albums_key(group_id: &str) -> String {
    format!("{FOLDER_ALBUMS_PREFIX}{group_id}")
}

/// Returns the cache key for an upload's resume ledger.
pub fn upload_meta_key(upload_id: &str) -> String {
    format!("{UPLOAD_META_PREFIX}{upload_id}")
}

/// Time to wait for any incoming frame before the connection is considered dead.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send keepalive pings.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(15);

/// Maximum accepted message size in bytes (16 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Timeout for request/reply round-trips (credential batches, completion).
///
/// Credential batches for thousands of files are signed server-side in one
/// go, so this is deliberately generous.
pub const WS_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Event name carried in every envelope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    // Handshake
    #[serde(rename = "join")]
    Join,
    #[serde(rename = "joined")]
    Joined,

    // Requests from the client (reply expected)
    #[serde(rename = "get_signed_url")]
    GetSignedUrl,
    #[serde(rename = "photo_done")]
    PhotoDone,

    // Notifications from the client (fire-and-forget)
    #[serde(rename = "progress_custom")]
    ProgressCustom,
    #[serde(rename = "add_resumeable_photos")]
    AddResumeablePhotos,
    #[serde(rename = "pending_photos")]
    PendingPhotos,
    #[serde(rename = "add_albums")]
    AddAlbums,
    #[serde(rename = "processing_message")]
    ProcessingMessage,
    #[serde(rename = "folder-information")]
    FolderInformation,

    // Pushed by the server
    #[serde(rename = "resume_pending_photos")]
    ResumePendingPhotos,
    #[serde(rename = "delete_pending_photos")]
    DeletePendingPhotos,
    #[serde(rename = "folder_albums")]
    FolderAlbums,
    #[serde(rename = "upload-photos")]
    UploadPhotos,

    // Sent in both directions
    #[serde(rename = "remove-uploading")]
    RemoveUploading,

    // Generic replies
    #[serde(rename = "reply")]
    Reply,
    #[serde(rename = "error")]
    Error,

    /// Forward compatibility: unknown events deserialize here.
    #[serde(other)]
    Unknown,
}

/// Error codes carried in [`crate::WireError`].
pub const ERR_CODE_UNAUTHORIZED: i32 = 401;
/// Codes from here up are server-side failures worth retrying.
pub const ERR_CODE_INTERNAL: i32 = 500;
