//! Small persistent string cache (the client's "local storage").
//!
//! Values are opaque strings; [`load_json`]/[`store_json`] add a typed
//! layer on top. The folder/album mapping is the main user.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use darkroom_protocol::FolderAlbums;
use darkroom_protocol::constants::folder_albums_key;

use crate::error::QueueError;

/// Synchronous key/value store for small values.
pub trait LocalCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, QueueError>;
    fn set(&self, key: &str, value: &str) -> Result<(), QueueError>;
    fn remove(&self, key: &str) -> Result<(), QueueError>;
}

fn poisoned<T>(_: T) -> QueueError {
    QueueError::Unavailable("cache lock poisoned".into())
}

/// In-process cache.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LocalCache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<String>, QueueError> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        self.entries
            .write()
            .map_err(poisoned)?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), QueueError> {
        self.entries.write().map_err(poisoned)?.remove(key);
        Ok(())
    }
}

/// Cache persisted as a single JSON object on disk.
///
/// Entries are held in memory and the whole map is rewritten on every
/// change (temp file + rename).
pub struct FileCache {
    path: PathBuf,
    entries: RwLock<HashMap<String, String>>,
}

impl FileCache {
    /// Opens the cache at `path`, loading existing entries.
    pub fn open(path: PathBuf) -> Result<Self, QueueError> {
        let entries = load_entries(&path)?;
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    fn persist(&self, map: &HashMap<String, String>) -> Result<(), QueueError> {
        let json = serde_json::to_string_pretty(map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("persisted {} cache entr(ies) to {:?}", map.len(), self.path);
        Ok(())
    }
}

fn load_entries(path: &Path) -> Result<HashMap<String, String>, QueueError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    let entries: HashMap<String, String> = serde_json::from_str(&data)?;
    debug!("loaded {} cache entr(ies) from {:?}", entries.len(), path);
    Ok(entries)
}

impl LocalCache for FileCache {
    fn get(&self, key: &str) -> Result<Option<String>, QueueError> {
        Ok(self.entries.read().map_err(poisoned)?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        let mut map = self.entries.write().map_err(poisoned)?;
        map.insert(key.to_string(), value.to_string());
        self.persist(&map)
    }

    fn remove(&self, key: &str) -> Result<(), QueueError> {
        let mut map = self.entries.write().map_err(poisoned)?;
        if map.remove(key).is_some() {
            self.persist(&map)?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed helpers
// ---------------------------------------------------------------------------

/// Reads and decodes a JSON value.
pub fn load_json<T: DeserializeOwned>(
    cache: &dyn LocalCache,
    key: &str,
) -> Result<Option<T>, QueueError> {
    match cache.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encodes and stores a JSON value.
pub fn store_json<T: Serialize>(
    cache: &dyn LocalCache,
    key: &str,
    value: &T,
) -> Result<(), QueueError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw)
}

/// Returns the cached album mapping for a group.
pub fn load_folder_albums(
    cache: &dyn LocalCache,
    group_id: &str,
) -> Result<Option<FolderAlbums>, QueueError> {
    load_json(cache, &folder_albums_key(group_id))
}

/// Caches the album mapping for a group.
pub fn save_folder_albums(
    cache: &dyn LocalCache,
    group_id: &str,
    albums: &FolderAlbums,
) -> Result<(), QueueError> {
    store_json(cache, &folder_albums_key(group_id), albums)
}

/// Drops the album mapping for a group.
pub fn clear_folder_albums(cache: &dyn LocalCache, group_id: &str) -> Result<(), QueueError> {
    cache.remove(&folder_albums_key(group_id))
}
