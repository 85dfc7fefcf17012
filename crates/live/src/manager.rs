//! Live connection manager.
//!
//! Owns the current [`WsClient`], tracks [`LinkState`], forwards server
//! pushes as [`LiveEvent`]s, and reconnects automatically with exponential
//! backoff on unexpected disconnects.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc};
use tracing::{info, warn};

use darkroom_protocol::constants::EventType;
use darkroom_protocol::envelope::Message;
use darkroom_protocol::messages::JoinReply;

use crate::reconnection::{LiveContext, cancel_reconnect, setup_ws_callbacks};
use crate::types::{LinkState, LiveConfig, LiveEvent, ReconnectConfig};
use crate::ws_client::{LiveError, WsClient};

pub struct LiveManager {
    ctx: LiveContext,
    events_rx: Mutex<Option<mpsc::Receiver<LiveEvent>>>,
}

impl LiveManager {
    pub fn new(config: LiveConfig) -> Self {
        Self::with_reconnect_config(config, ReconnectConfig::default())
    }

    pub fn with_reconnect_config(config: LiveConfig, reconnect_config: ReconnectConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(256);
        Self {
            ctx: LiveContext {
                config,
                ws_client: Arc::new(Mutex::new(None)),
                state: Arc::new(RwLock::new(LinkState::Offline)),
                events_tx,
                reconnect_cancel: Arc::new(std::sync::Mutex::new(None)),
                manual_disconnect: Arc::new(AtomicBool::new(false)),
                reconnect_config,
            },
            events_rx: Mutex::new(Some(events_rx)),
        }
    }

    /// Takes the event receiver. Can only be called once.
    pub async fn take_events(&self) -> Option<mpsc::Receiver<LiveEvent>> {
        self.events_rx.lock().await.take()
    }

    pub async fn state(&self) -> LinkState {
        self.ctx.state.read().await.clone()
    }

    pub fn group_id(&self) -> &str {
        &self.ctx.config.group_id
    }

    /// Connects and joins the configured gallery.
    pub async fn connect(&self) -> Result<JoinReply, LiveError> {
        cancel_reconnect(&self.ctx.reconnect_cancel);
        self.ctx.manual_disconnect.store(false, Ordering::Relaxed);
        self.close_client().await;

        self.ctx.set_state(LinkState::Connecting).await;
        info!(url = %self.ctx.config.url, group = %self.ctx.config.group_id, "connecting");

        let (client, joined) =
            match WsClient::connect(&self.ctx.config.url, &self.ctx.join_request()).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "connection failed");
                    self.ctx.set_state(LinkState::Offline).await;
                    return Err(e);
                }
            };

        setup_ws_callbacks(&client, self.ctx.clone()).await;
        *self.ctx.ws_client.lock().await = Some(Arc::new(client));
        self.ctx.set_state(LinkState::Online).await;
        info!(group = %joined.group_id, "joined");
        Ok(joined)
    }

    /// Sends a request and waits for its reply.
    pub async fn send_request<T: Serialize>(
        &self,
        event: EventType,
        payload: Option<&T>,
    ) -> Result<Message, LiveError> {
        self.client().await?.send_request(event, payload).await
    }

    /// Sends a fire-and-forget event.
    pub async fn send_event<T: Serialize>(
        &self,
        event: EventType,
        payload: Option<&T>,
    ) -> Result<(), LiveError> {
        self.client().await?.send_event(event, payload).await
    }

    /// Disconnects without reconnecting.
    pub async fn disconnect(&self) {
        self.ctx.manual_disconnect.store(true, Ordering::Relaxed);
        cancel_reconnect(&self.ctx.reconnect_cancel);
        if self.close_client().await {
            self.ctx.set_state(LinkState::Offline).await;
        }
    }

    pub async fn shutdown(&self) {
        self.disconnect().await;
        info!("live connection shut down");
    }

    async fn client(&self) -> Result<Arc<WsClient>, LiveError> {
        self.ctx
            .ws_client
            .lock()
            .await
            .clone()
            .ok_or(LiveError::Closed)
    }

    /// Closes the current client, if any. Returns whether one was open.
    async fn close_client(&self) -> bool {
        let client = self.ctx.ws_client.lock().await.take();
        match client {
            Some(client) => {
                client.close().await;
                true
            }
            None => false,
        }
    }
}
