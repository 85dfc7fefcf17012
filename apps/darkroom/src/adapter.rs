//! Adapter bridging `LiveManager` to the uploader's `LiveChannel` trait.

use std::sync::Arc;

use darkroom_live::{LiveError, LiveManager};
use darkroom_protocol::constants::EventType;
use darkroom_protocol::envelope::Message;
use darkroom_uploader::{ChannelFuture, LiveChannel, UploadError};

/// Implements [`LiveChannel`] by delegating to a shared [`LiveManager`].
pub struct LiveAdapter {
    mgr: Arc<LiveManager>,
}

impl LiveAdapter {
    pub fn new(mgr: Arc<LiveManager>) -> Self {
        Self { mgr }
    }
}

fn channel_error(e: LiveError) -> UploadError {
    UploadError::Channel(e.to_string())
}

impl LiveChannel for LiveAdapter {
    fn request(&self, event: EventType, payload: &serde_json::Value) -> ChannelFuture<'_, Message> {
        let payload = payload.clone();
        Box::pin(async move {
            self.mgr
                .send_request(event, Some(&payload))
                .await
                .map_err(channel_error)
        })
    }

    fn push(&self, event: EventType, payload: &serde_json::Value) -> ChannelFuture<'_, ()> {
        let payload = payload.clone();
        Box::pin(async move {
            self.mgr
                .send_event(event, Some(&payload))
                .await
                .map_err(channel_error)
        })
    }
}
