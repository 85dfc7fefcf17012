fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use darkroom_protocol::constants::EventType;
    use darkroom_protocol::messages::{
        DeletePendingPhotos, FolderInformation, PendingPhotosAnnouncement, PhotoDoneRequest,
        ProgressEvent, SignedUrlReply, SignedUrlRequest,
    };
    use darkroom_protocol::{FolderAlbums, Message};
    use darkroom_queue::{RecordStatus, UploadRecord};

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Normalizes JSON values so that integer-valued floats compare equal.
    fn normalize_value(v: &serde_json::Value) -> serde_json::Value {
        match v {
            serde_json::Value::Number(n) => {
                if let Some(f) = n.as_f64() {
                    serde_json::json!(f)
                } else {
                    v.clone()
                }
            }
            serde_json::Value::Object(map) => {
                let normalized: serde_json::Map<String, serde_json::Value> = map
                    .iter()
                    .map(|(k, v)| (k.clone(), normalize_value(v)))
                    .collect();
                serde_json::Value::Object(normalized)
            }
            serde_json::Value::Array(arr) => {
                serde_json::Value::Array(arr.iter().map(normalize_value).collect())
            }
            _ => v.clone(),
        }
    }

    /// Deserializes a fixture, re-serializes it, and compares the JSON
    /// values (order-independent, float-normalized comparison).
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));

        assert_eq!(
            normalize_value(&fixture),
            normalize_value(&reserialized),
            "roundtrip mismatch for {name}:\n  server: {fixture}\n  client: {reserialized}"
        );
        parsed
    }

    // --- Envelope ---

    #[test]
    fn fixture_message_envelope() {
        let msg: Message = roundtrip_test("message_envelope.json");
        assert_eq!(msg.event, EventType::GetSignedUrl);
        let request: SignedUrlRequest = msg.parse_payload().unwrap().unwrap();
        assert_eq!(request.files[0].id, "a1");
    }

    #[test]
    fn fixture_error_envelope() {
        let msg: Message = roundtrip_test("error_envelope.json");
        assert_eq!(msg.event, EventType::Error);
        assert!(msg.payload.is_none());
        assert_eq!(msg.error.unwrap().code, 401);
    }

    #[test]
    fn unknown_event_is_tolerated() {
        let msg: Message =
            serde_json::from_str(r#"{"id":"x","event":"gallery_renamed","payload":{}}"#).unwrap();
        assert_eq!(msg.event, EventType::Unknown);
    }

    // --- Credential round-trip ---

    #[test]
    fn fixture_signed_url_request() {
        let req: SignedUrlRequest = roundtrip_test("signed_url_request.json");
        assert_eq!(req.files.len(), 2);
        assert_eq!(req.files[1].mime_type, "image/png");
    }

    #[test]
    fn fixture_signed_url_reply() {
        let reply: SignedUrlReply = roundtrip_test("signed_url_reply.json");
        assert_eq!(reply.urls.len(), 2);
        assert_eq!(reply.invalid["a2"].error, "file too large");
        assert_eq!(reply.urls["a3"].fields["key"], "galleries/1207/a3.jpg");
    }

    #[test]
    fn signed_url_reply_without_invalid_section() {
        let reply: SignedUrlReply =
            serde_json::from_str(r#"{"urls":{"a1":{"url":"https://storage.example/a1"}}}"#)
                .unwrap();
        assert!(reply.invalid.is_empty());
    }

    // --- Completion and progress ---

    #[test]
    fn fixture_photo_done_request() {
        let req: PhotoDoneRequest = roundtrip_test("photo_done_request.json");
        assert_eq!(req.album_id.as_deref(), Some("42"));
    }

    #[test]
    fn fixture_progress_event() {
        let ev: ProgressEvent = roundtrip_test("progress_event.json");
        assert_eq!(ev.progress, 57);
        assert_eq!(ev.chunk_length, 3);
    }

    // --- Page notifications ---

    #[test]
    fn fixture_pending_photos() {
        let ann: PendingPhotosAnnouncement = roundtrip_test("pending_photos.json");
        assert_eq!(ann.files[0].error.as_deref(), Some("file too large"));
    }

    #[test]
    fn fixture_folder_information() {
        let info: FolderInformation = roundtrip_test("folder_information.json");
        assert_eq!(info.sub_folders.len(), 2);
    }

    #[test]
    fn fixture_delete_pending_photos() {
        let req: DeletePendingPhotos = roundtrip_test("delete_pending_photos.json");
        assert!(!req.delete_all);
        assert_eq!(req.photo.unwrap().uuid, "a2");
    }

    // --- Album mapping ---

    #[test]
    fn fixture_folder_albums() {
        let albums: FolderAlbums = roundtrip_test("folder_albums.json");
        assert_eq!(albums.albums["3f1e-dsp-Beach"].id, "42");
    }

    #[test]
    fn folder_albums_accept_numeric_ids() {
        let albums: FolderAlbums =
            serde_json::from_str(r#"{"albums":{"3f1e-dsp-Beach":{"id":42}}}"#).unwrap();
        assert_eq!(albums.albums["3f1e-dsp-Beach"].id, "42");
    }

    // --- Persisted queue records ---

    #[test]
    fn fixture_upload_record_valid() {
        let record: UploadRecord = roundtrip_test("upload_record_valid.json");
        assert!(record.is_valid());
        assert_eq!(record.file.data, [0xff, 0xd8, 0xff, 0xe0]);
        assert_eq!(record.container_id.as_deref(), Some("42"));
    }

    #[test]
    fn fixture_upload_record_invalid() {
        let record: UploadRecord = roundtrip_test("upload_record_invalid.json");
        assert_eq!(
            record.status,
            RecordStatus::Invalid {
                error: "file too large".into()
            }
        );
        assert!(record.destination.is_none());
    }
}
