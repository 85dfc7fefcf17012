//! Gallery upload orchestration.
//!
//! This crate holds the business logic of the upload client and has no
//! transport of its own: the app provides a [`LiveChannel`] over its
//! WebSocket connection, a [`DurableQueue`](darkroom_queue::DurableQueue)
//! and a [`ChunkedTransport`](darkroom_transfer::ChunkedTransport).
//!
//! # Flow
//!
//! 1. **Identify**: each selected file gets a UUID
//! 2. **Sign**: one `get_signed_url` round-trip for the whole selection
//! 3. **Persist**: every verdict goes to the durable queue
//! 4. **Drain**: batches of records through a bounded worker pool
//! 5. **Confirm**: `photo_done`, then the record is dropped
//!
//! Connectivity changes pause and resume the drain; whatever is still in
//! the queue after a restart is resumed on the next mount.

pub mod channel;
pub mod credentials;
pub mod error;
pub mod folder;
pub mod handlers;
pub mod identify;
pub mod pool;
pub mod resume;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

pub use channel::{ChannelFuture, LiveChannel};
pub use credentials::{CredentialOutcome, acquire_credentials};
pub use error::UploadError;
pub use folder::{
    FolderSelection, ScannedFile, decode_name, detect_content_type, resolve_container, scan_folder,
    select_folder,
};
pub use handlers::{
    DeleteScope, UploadReport, delete_pending, handle_push, queued, remove_uploading, retry_pending,
    start_upload, store_folder_albums, upload_photos,
};
pub use identify::{PendingUpload, assign_identifiers};
pub use pool::{WorkerPool, drain};
pub use resume::{Connectivity, ConnectivityMachine, ResumeSummary, Transition, pause, resume};
pub use session::{Backends, UploadSession};
pub use types::{DrainSummary, SelectedFile, UploadConfig, UploadEvent};
