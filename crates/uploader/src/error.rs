//! Upload error types.

/// Errors produced by the upload orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("queue error: {0}")]
    Queue(#[from] darkroom_queue::QueueError),

    #[error("transfer error: {0}")]
    Transfer(#[from] darkroom_transfer::TransferError),

    #[error("live channel error: {0}")]
    Channel(String),

    #[error("unexpected reply: {0}")]
    Reply(String),

    #[error("session closed")]
    Closed,

    #[error("cancelled")]
    Cancelled,
}
