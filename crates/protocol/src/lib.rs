//! Wire types shared by the Darkroom upload client.
//!
//! Everything that crosses the live connection (event names, the message
//! envelope, request/reply payloads) or is persisted in the durable queue
//! lives here so the other crates agree on a single JSON shape.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use constants::EventType;
pub use envelope::{Message, WireError};
pub use types::{AlbumRef, Destination, FilePayload, FolderAlbums};
