//! Durable queue trait and its implementations.

use std::collections::BTreeMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::RwLock;

use tracing::{debug, warn};

use crate::error::QueueError;
use crate::record::UploadRecord;

/// Boxed future returned by [`DurableQueue`] operations.
pub type QueueFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, QueueError>> + Send + 'a>>;

/// Persistent key/value store of upload records, keyed by record id.
///
/// Each operation is atomic for a single record. Nothing spans keys.
pub trait DurableQueue: Send + Sync {
    /// Inserts or replaces a record.
    fn put(&self, record: UploadRecord) -> QueueFuture<'_, ()>;

    /// Returns every stored record, ordered by id.
    fn get_all(&self) -> QueueFuture<'_, Vec<UploadRecord>>;

    /// Removes a record. Deleting a missing id is not an error.
    fn delete(&self, id: String) -> QueueFuture<'_, ()>;
}

// ---------------------------------------------------------------------------
// MemoryQueue
// ---------------------------------------------------------------------------

/// In-process queue. Does not survive a restart; used for tests and for
/// sessions that explicitly opt out of persistence.
#[derive(Default)]
pub struct MemoryQueue {
    records: RwLock<BTreeMap<String, UploadRecord>>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if a record with this id is stored.
    pub fn contains(&self, id: &str) -> bool {
        self.records
            .read()
            .map(|m| m.contains_key(id))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned<T>(_: T) -> QueueError {
    QueueError::Unavailable("queue lock poisoned".into())
}

impl DurableQueue for MemoryQueue {
    fn put(&self, record: UploadRecord) -> QueueFuture<'_, ()> {
        Box::pin(async move {
            let mut map = self.records.write().map_err(poisoned)?;
            map.insert(record.id.clone(), record);
            Ok(())
        })
    }

    fn get_all(&self) -> QueueFuture<'_, Vec<UploadRecord>> {
        Box::pin(async move {
            let map = self.records.read().map_err(poisoned)?;
            Ok(map.values().cloned().collect())
        })
    }

    fn delete(&self, id: String) -> QueueFuture<'_, ()> {
        Box::pin(async move {
            let mut map = self.records.write().map_err(poisoned)?;
            map.remove(&id);
            Ok(())
        })
    }
}

// ---------------------------------------------------------------------------
// FileQueue
// ---------------------------------------------------------------------------

const RECORD_EXT: &str = "json";
const TEMP_EXT: &str = "tmp";

/// On-disk queue: one JSON file per record under a directory.
///
/// Writes go to `<id>.tmp` and are renamed over `<id>.json`, so a process
/// killed mid-write leaves either the old record or the new one, never a
/// torn file. Leftover temp files are removed on the next enumeration.
pub struct FileQueue {
    dir: PathBuf,
}

impl FileQueue {
    /// Opens (and creates if needed) a queue rooted at `dir`.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, QueueError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        debug!(dir = %dir.display(), "opened file queue");
        Ok(Self { dir })
    }

    fn record_path(&self, id: &str) -> Result<PathBuf, QueueError> {
        validate_key(id)?;
        Ok(self.dir.join(format!("{id}.{RECORD_EXT}")))
    }
}

/// Rejects ids that could escape the queue directory.
fn validate_key(id: &str) -> Result<(), QueueError> {
    let bad = id.is_empty()
        || id.contains(['/', '\\'])
        || id.contains("..")
        || id.starts_with('.');
    if bad {
        return Err(QueueError::InvalidKey(id.to_string()));
    }
    Ok(())
}

impl DurableQueue for FileQueue {
    fn put(&self, record: UploadRecord) -> QueueFuture<'_, ()> {
        Box::pin(async move {
            let path = self.record_path(&record.id)?;
            let tmp = path.with_extension(TEMP_EXT);
            let json = serde_json::to_vec(&record)?;

            tokio::fs::write(&tmp, &json).await?;
            tokio::fs::rename(&tmp, &path).await?;
            Ok(())
        })
    }

    fn get_all(&self) -> QueueFuture<'_, Vec<UploadRecord>> {
        Box::pin(async move {
            let mut records = Vec::new();
            let mut entries = tokio::fs::read_dir(&self.dir).await?;

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                match path.extension().and_then(|e| e.to_str()) {
                    Some(RECORD_EXT) => {}
                    Some(TEMP_EXT) => {
                        debug!(path = %path.display(), "removing interrupted write");
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    _ => continue,
                }

                let data = tokio::fs::read(&path).await?;
                match serde_json::from_slice::<UploadRecord>(&data) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        // Cannot come from our own writes; leave it for inspection.
                        warn!(path = %path.display(), error = %e, "skipping unreadable record");
                    }
                }
            }

            records.sort_by(|a, b| a.id.cmp(&b.id));
            Ok(records)
        })
    }

    fn delete(&self, id: String) -> QueueFuture<'_, ()> {
        Box::pin(async move {
            let path = self.record_path(&id)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}
