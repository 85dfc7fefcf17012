//! Reconnection with exponential backoff.
//!
//! Contains the shared [`LiveContext`], cancellation helpers, WebSocket
//! callback setup, and the reconnect loop.

use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::{Mutex, RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use darkroom_protocol::messages::JoinRequest;

use crate::types::{LinkState, LiveConfig, LiveEvent, ReconnectConfig};
use crate::ws_client::{LiveError, WsClient};

/// Manager state shared with callbacks and the reconnect task.
#[derive(Clone)]
pub(crate) struct LiveContext {
    pub(crate) config: LiveConfig,
    pub(crate) ws_client: Arc<Mutex<Option<Arc<WsClient>>>>,
    pub(crate) state: Arc<RwLock<LinkState>>,
    pub(crate) events_tx: mpsc::Sender<LiveEvent>,
    pub(crate) reconnect_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    pub(crate) manual_disconnect: Arc<AtomicBool>,
    pub(crate) reconnect_config: ReconnectConfig,
}

impl LiveContext {
    pub(crate) fn join_request(&self) -> JoinRequest {
        JoinRequest {
            group_id: self.config.group_id.clone(),
            token: self.config.token.clone(),
        }
    }

    pub(crate) async fn set_state(&self, new_state: LinkState) {
        *self.state.write().await = new_state.clone();
        let _ = self
            .events_tx
            .send(LiveEvent::StateChanged(new_state))
            .await;
    }
}

/// Cancels the active reconnect loop, if any.
pub(crate) fn cancel_reconnect(reconnect_cancel: &std::sync::Mutex<Option<CancellationToken>>) {
    if let Ok(mut guard) = reconnect_cancel.lock()
        && let Some(token) = guard.take()
    {
        token.cancel();
    }
}

/// Installs push forwarding and the disconnect handler on a fresh client.
pub(crate) async fn setup_ws_callbacks(client: &WsClient, ctx: LiveContext) {
    let events_tx = ctx.events_tx.clone();
    client
        .set_event_callback(Box::new(move |event, message| {
            trace!(event = ?event, "forwarding server push");
            if let Err(e) = events_tx.try_send(LiveEvent::Push { event, message }) {
                warn!("failed to forward server push: {e}");
            }
        }))
        .await;

    let rejected = client.rejected();
    client
        .set_disconnect_callback(Box::new(move || {
            let stale = ctx.ws_client.try_lock().ok().and_then(|mut c| c.take());

            if let Ok(mut s) = ctx.state.try_write() {
                *s = LinkState::Offline;
            }
            let _ = ctx
                .events_tx
                .try_send(LiveEvent::StateChanged(LinkState::Offline));

            let manual = ctx.manual_disconnect.load(Ordering::Relaxed);
            if manual || rejected.load(Ordering::Relaxed) {
                debug!(manual, "not reconnecting");
                return;
            }

            let cancel = CancellationToken::new();
            cancel_reconnect(&ctx.reconnect_cancel);
            if let Ok(mut guard) = ctx.reconnect_cancel.lock() {
                *guard = Some(cancel.clone());
            }

            let ctx = ctx.clone();
            tokio::spawn(async move {
                drop(stale);
                reconnect_loop(ctx, cancel).await;
            });
        }))
        .await;
}

/// Reconnects until joined, rejected, out of attempts, or cancelled.
///
/// Boxed to break the type cycle with [`setup_ws_callbacks`], whose
/// disconnect handler spawns this loop.
pub(crate) fn reconnect_loop(
    ctx: LiveContext,
    cancel: CancellationToken,
) -> Pin<Box<dyn std::future::Future<Output = ()> + Send>> {
    Box::pin(async move {
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            if !ctx.reconnect_config.allows(attempt) {
                warn!(attempt, "giving up on reconnect");
                ctx.set_state(LinkState::Offline).await;
                break;
            }

            let delay = ctx.reconnect_config.delay_for_attempt(attempt);
            let delay_secs = delay.as_secs_f64();
            ctx.set_state(LinkState::Reconnecting { attempt }).await;
            let _ = ctx
                .events_tx
                .send(LiveEvent::Reconnecting {
                    attempt,
                    next_retry_secs: delay_secs,
                })
                .await;

            info!(
                attempt,
                delay_secs = format_args!("{delay_secs:.1}"),
                "reconnecting"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            match WsClient::connect(&ctx.config.url, &ctx.join_request()).await {
                Ok((client, _)) => {
                    if cancel.is_cancelled() {
                        client.close().await;
                        return;
                    }
                    setup_ws_callbacks(&client, ctx.clone()).await;
                    *ctx.ws_client.lock().await = Some(Arc::new(client));
                    ctx.set_state(LinkState::Online).await;
                    info!(group = %ctx.config.group_id, "reconnected");
                    break;
                }
                Err(LiveError::JoinRejected(reason)) => {
                    warn!(%reason, "join rejected, stopping reconnect");
                    ctx.set_state(LinkState::Offline).await;
                    break;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "reconnect attempt failed");
                }
            }

            if cancel.is_cancelled() {
                return;
            }
        }

        if let Ok(mut guard) = ctx.reconnect_cancel.lock() {
            *guard = None;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn context(reconnect_config: ReconnectConfig) -> (LiveContext, mpsc::Receiver<LiveEvent>) {
        let (events_tx, events_rx) = mpsc::channel(64);
        let ctx = LiveContext {
            config: LiveConfig {
                // Nothing listens on the discard port.
                url: "ws://127.0.0.1:9/live".into(),
                group_id: "g1".into(),
                token: String::new(),
            },
            ws_client: Arc::new(Mutex::new(None)),
            state: Arc::new(RwLock::new(LinkState::Offline)),
            events_tx,
            reconnect_cancel: Arc::new(std::sync::Mutex::new(None)),
            manual_disconnect: Arc::new(AtomicBool::new(false)),
            reconnect_config,
        };
        (ctx, events_rx)
    }

    #[test]
    fn cancel_reconnect_clears_token() {
        let slot = std::sync::Mutex::new(None);
        let token = CancellationToken::new();
        *slot.lock().unwrap() = Some(token.clone());

        cancel_reconnect(&slot);

        assert!(slot.lock().unwrap().is_none());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn reconnect_loop_gives_up_after_max_attempts() {
        let (ctx, mut events) = context(ReconnectConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 1.0,
            max_attempts: Some(2),
        });

        reconnect_loop(ctx.clone(), CancellationToken::new()).await;

        let mut attempts = Vec::new();
        let mut last_state = None;
        while let Ok(ev) = events.try_recv() {
            match ev {
                LiveEvent::Reconnecting { attempt, .. } => attempts.push(attempt),
                LiveEvent::StateChanged(s) => last_state = Some(s),
                LiveEvent::Push { .. } => {}
            }
        }
        assert_eq!(attempts, [1, 2]);
        assert_eq!(last_state, Some(LinkState::Offline));
        assert_eq!(*ctx.state.read().await, LinkState::Offline);
    }

    #[tokio::test]
    async fn reconnect_loop_stops_on_cancel() {
        let (ctx, _events) = context(ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            ..ReconnectConfig::default()
        });
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reconnect_loop(ctx, cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
    }
}
