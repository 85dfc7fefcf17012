//! Live connection to the gallery server.
//!
//! Provides a WebSocket client with request/reply correlation, keepalive
//! pumps, the `join` handshake, and a [`LiveManager`] that reports
//! online/offline transitions and reconnects with backoff.

mod handshake;
pub mod manager;
mod pumps;
pub(crate) mod reconnection;
pub mod types;
pub mod ws_client;

pub use manager::LiveManager;
pub use types::{LinkState, LiveConfig, LiveEvent, ReconnectConfig};
pub use ws_client::{LiveError, WsClient};
