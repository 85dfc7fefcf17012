//! Data types for the upload flow.

use std::path::Path;

use darkroom_protocol::FilePayload;
use darkroom_protocol::constants::{CHUNK_SIZE, DEFAULT_BATCH_SIZE, DEFAULT_CONCURRENCY};

use crate::error::UploadError;
use crate::folder::detect_content_type;

/// MIME type used when the extension says nothing.
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// A file picked by the user, before it has an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedFile {
    pub file: FilePayload,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file: FilePayload::new(name, mime_type, data),
        }
    }

    /// Reads a file from disk, guessing its type from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, UploadError> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mime = detect_content_type(&name).unwrap_or(FALLBACK_CONTENT_TYPE);
        Ok(Self::new(name, mime, data))
    }
}

/// Tuning knobs of an upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadConfig {
    /// Transports allowed in flight at once.
    pub concurrency: usize,
    /// Records submitted to the pool per batch.
    pub batch_size: usize,
    /// Bytes per transport chunk.
    pub chunk_size: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            chunk_size: CHUNK_SIZE,
        }
    }
}

impl UploadConfig {
    /// Replaces zero values with the defaults.
    pub fn normalized(self) -> Self {
        let defaults = Self::default();
        Self {
            concurrency: if self.concurrency == 0 { defaults.concurrency } else { self.concurrency },
            batch_size: if self.batch_size == 0 { defaults.batch_size } else { self.batch_size },
            chunk_size: if self.chunk_size == 0 { defaults.chunk_size } else { self.chunk_size },
        }
    }
}

/// Progress event emitted by an upload session.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    /// A batch was handed to the pool.
    BatchStarted { index: usize, count: usize, size: usize },
    /// A chunk of one upload was acknowledged.
    Progress {
        id: String,
        percent: u8,
        uploaded_bytes: u64,
        total_bytes: u64,
    },
    /// The server confirmed the upload and the record was dropped.
    Completed { id: String },
    /// The upload failed; its record stays queued.
    Failed { id: String, error: String },
}

/// What one drain accomplished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    /// Batches handed to the pool.
    pub batches: usize,
    pub completed: usize,
    pub failed: usize,
    /// Uploads stopped by a pause, an abort or a removal.
    pub cancelled: usize,
    /// The drain stopped before its last batch.
    pub paused: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_defaults() {
        let config = UploadConfig::default();
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.batch_size, 5000);
        assert_eq!(config.chunk_size, 2_621_440);
    }

    #[test]
    fn normalized_fills_zeroes() {
        let config = UploadConfig {
            concurrency: 0,
            batch_size: 10,
            chunk_size: 0,
        }
        .normalized();
        assert_eq!(config.concurrency, 6);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.chunk_size, 2_621_440);
    }

    #[tokio::test]
    async fn selected_file_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Sunset.JPG");
        std::fs::write(&path, b"jpegdata").unwrap();

        let selected = SelectedFile::from_path(&path).await.unwrap();
        assert_eq!(selected.file.name, "Sunset.JPG");
        assert_eq!(selected.file.mime_type, "image/jpeg");
        assert_eq!(selected.file.size, 8);

        let other = dir.path().join("notes.txt");
        std::fs::write(&other, b"x").unwrap();
        let selected = SelectedFile::from_path(&other).await.unwrap();
        assert_eq!(selected.file.mime_type, FALLBACK_CONTENT_TYPE);
    }
}
