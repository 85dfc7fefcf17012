//! WebSocket client for the gallery live connection.
//!
//! Implements request/reply with UUID correlation, fire-and-forget events,
//! ping/pong keepalive, and push event dispatching.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_tungstenite::tungstenite;

use darkroom_protocol::constants::{EventType, WS_MAX_MESSAGE_SIZE, WS_REQUEST_TIMEOUT};
use darkroom_protocol::envelope::Message;
use darkroom_protocol::messages::{JoinReply, JoinRequest};

/// Errors from the live connection.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("join rejected: {0}")]
    JoinRejected(String),

    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },
}

/// Callback type for server pushes.
pub type EventCallback = Box<dyn Fn(EventType, Message) + Send + Sync>;

/// Callback type for disconnect notification.
pub(crate) type DisconnectCallback = Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>;

/// Replies awaited by in-flight requests, keyed by message id.
pub(crate) type PendingReplies = Arc<Mutex<HashMap<String, oneshot::Sender<Message>>>>;

/// WebSocket client joined to one gallery.
pub struct WsClient {
    write_tx: mpsc::Sender<tungstenite::Message>,
    pending: PendingReplies,
    on_event: Arc<Mutex<Option<EventCallback>>>,
    on_disconnect: DisconnectCallback,
    /// Set by the read pump when the server closes with a policy violation
    /// (bad token, unknown gallery). Reconnecting would not help.
    rejected: Arc<AtomicBool>,
    _read_handle: tokio::task::JoinHandle<()>,
    _write_handle: tokio::task::JoinHandle<()>,
    _ping_handle: tokio::task::JoinHandle<()>,
    cancel: tokio_util::sync::CancellationToken,
}

impl WsClient {
    /// Connects and performs the `join` handshake.
    pub async fn connect(url: &str, join: &JoinRequest) -> Result<(Self, JoinReply), LiveError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let (ws_stream, _) =
            tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false).await?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let on_event: Arc<Mutex<Option<EventCallback>>> = Arc::new(Mutex::new(None));
        let on_disconnect: DisconnectCallback = Arc::new(Mutex::new(None));
        let rejected = Arc::new(AtomicBool::new(false));
        let cancel = tokio_util::sync::CancellationToken::new();

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let pending = pending.clone();
            let on_event = on_event.clone();
            let on_disconnect = on_disconnect.clone();
            let rejected = rejected.clone();
            let cancel = cancel.clone();
            let write_tx = write_tx.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read,
                pending,
                on_event,
                on_disconnect,
                rejected,
                write_tx,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(write_tx, cancel))
        };

        let client = Self {
            write_tx,
            pending,
            on_event,
            on_disconnect,
            rejected,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
            cancel,
        };

        let joined = crate::handshake::perform_join(&client, join).await?;
        Ok((client, joined))
    }

    /// Sends a request and waits for the reply with the same id.
    pub async fn send_request<T: Serialize>(
        &self,
        event: EventType,
        payload: Option<&T>,
    ) -> Result<Message, LiveError> {
        let id = uuid::Uuid::new_v4().to_string();
        let msg = Message::new(&id, event, payload)?;
        let json = serde_json::to_string(&msg)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        if self
            .write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            return Err(LiveError::Closed);
        }

        let result = tokio::time::timeout(WS_REQUEST_TIMEOUT, rx).await;

        // Clean up pending entry on any exit path.
        self.pending.lock().await.remove(&id);

        match result {
            Ok(Ok(resp)) => {
                if let Some(err) = &resp.error {
                    return Err(LiveError::Server {
                        code: err.code,
                        message: err.message.clone(),
                    });
                }
                Ok(resp)
            }
            Ok(Err(_)) => Err(LiveError::Closed),
            Err(_) => Err(LiveError::Timeout),
        }
    }

    /// Sends an event without waiting for anything back.
    pub async fn send_event<T: Serialize>(
        &self,
        event: EventType,
        payload: Option<&T>,
    ) -> Result<(), LiveError> {
        let id = uuid::Uuid::new_v4().to_string();
        let json = serde_json::to_string(&Message::new(id, event, payload)?)?;
        self.write_tx
            .send(tungstenite::Message::Text(json.into()))
            .await
            .map_err(|_| LiveError::Closed)
    }

    /// Sets the callback for server pushes.
    pub async fn set_event_callback(&self, cb: EventCallback) {
        *self.on_event.lock().await = Some(cb);
    }

    /// Sets the callback for disconnection.
    pub async fn set_disconnect_callback(&self, cb: Box<dyn Fn() + Send + Sync>) {
        *self.on_disconnect.lock().await = Some(cb);
    }

    /// Flag raised when the server refused this client on close.
    pub fn rejected(&self) -> Arc<AtomicBool> {
        self.rejected.clone()
    }

    /// Gracefully closes the connection.
    ///
    /// A local close is not a disconnect: the disconnect callback is
    /// removed first so it never fires for this.
    pub async fn close(&self) {
        self.on_disconnect.lock().await.take();
        self.cancel.cancel();
        let _ = self.write_tx.send(tungstenite::Message::Close(None)).await;
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._write_handle.abort();
        self._ping_handle.abort();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use darkroom_protocol::messages::ProcessingMessage;

    /// Builds a client wired to an in-memory write channel instead of a socket.
    pub(crate) fn detached_client() -> (WsClient, mpsc::Receiver<tungstenite::Message>, PendingReplies)
    {
        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(16);
        let pending: PendingReplies = Arc::new(Mutex::new(HashMap::new()));
        let client = WsClient {
            write_tx,
            pending: pending.clone(),
            on_event: Arc::new(Mutex::new(None)),
            on_disconnect: Arc::new(Mutex::new(None)),
            rejected: Arc::new(AtomicBool::new(false)),
            _read_handle: tokio::spawn(async {}),
            _write_handle: tokio::spawn(async {}),
            _ping_handle: tokio::spawn(async {}),
            cancel: tokio_util::sync::CancellationToken::new(),
        };
        (client, write_rx, pending)
    }

    fn sent_message(frame: tungstenite::Message) -> Message {
        match frame {
            tungstenite::Message::Text(text) => serde_json::from_str(&text).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    #[test]
    fn live_error_display() {
        assert_eq!(LiveError::Timeout.to_string(), "request timed out");
        assert_eq!(LiveError::Closed.to_string(), "connection closed");
        assert_eq!(
            LiveError::JoinRejected("unknown gallery".into()).to_string(),
            "join rejected: unknown gallery"
        );
        let err = LiveError::Server {
            code: 401,
            message: "unauthorized".into(),
        };
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn send_request_resolves_with_matching_reply() {
        let (client, mut write_rx, pending) = detached_client();
        let client = Arc::new(client);

        let c = client.clone();
        let handle = tokio::spawn(async move {
            c.send_request(EventType::PhotoDone, Some(&serde_json::json!({"id": "p1"})))
                .await
        });

        let sent = sent_message(write_rx.recv().await.unwrap());
        assert_eq!(sent.event, EventType::PhotoDone);

        let reply = sent.reply(Some(&serde_json::json!({"ok": true}))).unwrap();
        let tx = pending.lock().await.remove(&sent.id).unwrap();
        tx.send(reply).unwrap();

        let resp = handle.await.unwrap().unwrap();
        assert_eq!(resp.id, sent.id);
        assert_eq!(resp.event, EventType::Reply);
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn send_request_surfaces_server_error() {
        let (client, mut write_rx, pending) = detached_client();
        let client = Arc::new(client);

        let c = client.clone();
        let handle =
            tokio::spawn(async move { c.send_request::<()>(EventType::GetSignedUrl, None).await });

        let sent = sent_message(write_rx.recv().await.unwrap());
        let tx = pending.lock().await.remove(&sent.id).unwrap();
        tx.send(sent.reply_error(500, "issuer down")).unwrap();

        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, LiveError::Server { code: 500, .. }));
    }

    #[tokio::test]
    async fn send_request_times_out() {
        tokio::time::pause();
        let (client, _write_rx, pending) = detached_client();

        let err = client
            .send_request::<()>(EventType::PhotoDone, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::Timeout));
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn send_event_is_fire_and_forget() {
        let (client, mut write_rx, pending) = detached_client();
        client
            .send_event(EventType::ProcessingMessage, Some(&ProcessingMessage { show: true }))
            .await
            .unwrap();

        let sent = sent_message(write_rx.recv().await.unwrap());
        assert_eq!(sent.event, EventType::ProcessingMessage);
        let payload: ProcessingMessage = sent.parse_payload().unwrap().unwrap();
        assert!(payload.show);
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn send_event_on_closed_channel_fails() {
        let (client, write_rx, _) = detached_client();
        drop(write_rx);
        let err = client
            .send_event::<()>(EventType::ProgressCustom, None)
            .await
            .unwrap_err();
        assert!(matches!(err, LiveError::Closed));
    }
}
