//! Durable upload queue and local key/value cache.
//!
//! The queue holds one [`UploadRecord`] per selected file and is the only
//! state that survives a restart: whatever is still in it is, by
//! definition, the pending work. The cache is a small string store for
//! auxiliary data (folder/album mappings, transport resume ledgers).

pub mod cache;
pub mod error;
pub mod record;
pub mod store;

pub use cache::{
    FileCache, LocalCache, MemoryCache, clear_folder_albums, load_folder_albums, load_json,
    save_folder_albums, store_json,
};
pub use error::QueueError;
pub use record::{RecordStatus, UploadRecord, partition_group};
pub use store::{DurableQueue, FileQueue, MemoryQueue, QueueFuture};
