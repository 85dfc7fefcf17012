//! Live channel trait.
//!
//! `LiveChannel` is implemented by the client app to bridge the
//! orchestrator to the actual WebSocket connection. Keeping it a trait
//! lets every flow here run against an in-memory fake.

use std::future::Future;
use std::pin::Pin;

use serde::Serialize;

use darkroom_protocol::constants::EventType;
use darkroom_protocol::envelope::Message;

use crate::error::UploadError;

/// Boxed future returned by [`LiveChannel`] operations.
pub type ChannelFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, UploadError>> + Send + 'a>>;

/// Abstract connection to the gallery page's server.
pub trait LiveChannel: Send + Sync {
    /// Sends a request and waits for the correlated reply.
    fn request(&self, event: EventType, payload: &serde_json::Value) -> ChannelFuture<'_, Message>;

    /// Sends a fire-and-forget event.
    fn push(&self, event: EventType, payload: &serde_json::Value) -> ChannelFuture<'_, ()>;
}

/// Serializes `payload` and pushes it.
pub(crate) async fn push_typed<T: Serialize>(
    channel: &dyn LiveChannel,
    event: EventType,
    payload: &T,
) -> Result<(), UploadError> {
    let value = serde_json::to_value(payload)?;
    channel.push(event, &value).await
}

/// Serializes `payload`, sends it as a request and returns the reply.
pub(crate) async fn request_typed<T: Serialize>(
    channel: &dyn LiveChannel,
    event: EventType,
    payload: &T,
) -> Result<Message, UploadError> {
    let value = serde_json::to_value(payload)?;
    channel.request(event, &value).await
}
