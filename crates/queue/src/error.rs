//! Queue error types.

/// Errors produced by the durable queue and the local cache.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid record key: {0}")]
    InvalidKey(String),

    #[error("record {id} is already {status}")]
    InvalidTransition { id: String, status: &'static str },

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}
