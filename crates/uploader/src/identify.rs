//! Identifier assignment.
//!
//! Every selected file gets a UUID before anything touches the network.
//! The id keys the durable queue, the credential reply and the transport
//! ledger, so it must never change once assigned.

use darkroom_protocol::FilePayload;
use darkroom_protocol::messages::FileDescriptor;
use darkroom_queue::UploadRecord;

use crate::types::SelectedFile;

/// A file with its identifier, waiting for credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingUpload {
    pub id: String,
    pub file: FilePayload,
}

impl PendingUpload {
    /// Rebuilds a pending upload from a stored record, keeping its id.
    pub fn from_record(record: UploadRecord) -> Self {
        Self {
            id: record.id,
            file: record.file,
        }
    }

    pub fn descriptor(&self) -> FileDescriptor {
        FileDescriptor::describe(&self.id, &self.file)
    }
}

/// Gives each selected file a fresh UUID v4, preserving order.
pub fn assign_identifiers(files: Vec<SelectedFile>) -> Vec<PendingUpload> {
    files
        .into_iter()
        .map(|selected| PendingUpload {
            id: uuid::Uuid::new_v4().to_string(),
            file: selected.file,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use crate::testing::{GROUP, invalid_record};

    fn selection(n: usize) -> Vec<SelectedFile> {
        (0..n)
            .map(|i| SelectedFile::new(format!("IMG_{i}.jpg"), "image/jpeg", vec![i as u8; 3]))
            .collect()
    }

    #[test]
    fn ids_are_unique_and_order_is_kept() {
        let pending = assign_identifiers(selection(500));
        assert_eq!(pending.len(), 500);

        let ids: HashSet<&str> = pending.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids.len(), 500);
        assert_eq!(pending[0].file.name, "IMG_0.jpg");
        assert_eq!(pending[499].file.name, "IMG_499.jpg");
        assert!(uuid::Uuid::parse_str(&pending[0].id).is_ok());
    }

    #[test]
    fn descriptor_carries_metadata_only() {
        let pending = assign_identifiers(selection(1)).remove(0);
        let desc = pending.descriptor();
        assert_eq!(desc.id, pending.id);
        assert_eq!(desc.size, 3);
        assert_eq!(desc.mime_type, "image/jpeg");
        assert_eq!(desc.name, "IMG_0.jpg");
    }

    #[test]
    fn stored_id_wins_on_resume() {
        let record = invalid_record("stored-id", "a.jpg", "quota");
        assert_eq!(record.group_id, GROUP);
        let pending = PendingUpload::from_record(record);
        assert_eq!(pending.id, "stored-id");
        assert_eq!(pending.file.name, "a.jpg");
    }
}
