//! Inbound frames: replies are routed to their waiting request, everything
//! else goes to the push callback.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use darkroom_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use darkroom_protocol::envelope::Message;

use crate::ws_client::{DisconnectCallback, EventCallback, PendingReplies};

/// Reads frames until the socket ends, the server goes silent for
/// [`WS_PONG_WAIT`], or `cancel` fires. Calls the disconnect callback on exit.
pub(crate) async fn read_pump<S>(
    mut read: S,
    pending: PendingReplies,
    on_event: Arc<Mutex<Option<EventCallback>>>,
    on_disconnect: DisconnectCallback,
    rejected: Arc<AtomicBool>,
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: StreamExt<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    // Any incoming frame, not just a pong, pushes the deadline out.
    let pong_deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(pong_deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            () = &mut pong_deadline => {
                warn!("no traffic within pong wait, closing");
                break;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(msg)) => {
                        pong_deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                        match msg {
                            tungstenite::Message::Text(text) => {
                                handle_text_message(&text, &pending, &on_event).await;
                            }
                            tungstenite::Message::Ping(data) => {
                                trace!("received ping, sending pong");
                                let _ = write_tx.send(tungstenite::Message::Pong(data)).await;
                            }
                            tungstenite::Message::Pong(_) => {
                                trace!("received pong");
                            }
                            tungstenite::Message::Close(frame) => {
                                if let Some(f) = &frame
                                    && f.code == CloseCode::Policy
                                {
                                    debug!(reason = f.reason.as_str(), "server refused this client");
                                    rejected.store(true, Ordering::Relaxed);
                                }
                                debug!("received close frame");
                                break;
                            }
                            _ => {}
                        }
                    }
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    // Stop the sibling pumps so later sends fail fast instead of queueing.
    cancel.cancel();
    // Wake every request still waiting; their senders drop here.
    pending.lock().await.clear();

    if let Some(cb) = on_disconnect.lock().await.as_ref() {
        cb();
    }
}

async fn handle_text_message(
    text: &str,
    pending: &PendingReplies,
    on_event: &Arc<Mutex<Option<EventCallback>>>,
) {
    if text.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", text.len());
        return;
    }

    let msg: Message = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("failed to parse message: {e}");
            return;
        }
    };

    trace!(event = ?msg.event, id = %msg.id, "received message");

    let mut map = pending.lock().await;
    if let Some(tx) = map.remove(&msg.id) {
        let _ = tx.send(msg);
        return;
    }
    drop(map);

    let guard = on_event.lock().await;
    if let Some(cb) = guard.as_ref() {
        cb(msg.event.clone(), msg);
    } else {
        warn!(event = ?msg.event, id = %msg.id, "no event callback set, dropping push");
    }
}
