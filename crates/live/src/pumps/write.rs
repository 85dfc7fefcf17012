//! Outbound frames, serialised through one task.

use futures_util::SinkExt;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::error;

/// Forwards queued frames to the socket; sends a close frame on exit.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<tungstenite::Message>,
    cancel: CancellationToken,
) where
    S: SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
{
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            msg = write_rx.recv() => {
                let Some(m) = msg else { break };
                if let Err(e) = write.send(m).await {
                    error!("WebSocket write error: {e}");
                    break;
                }
            }
        }
    }

    let _ = write.send(tungstenite::Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;

    fn capture() -> (
        impl SinkExt<tungstenite::Message, Error = tungstenite::Error> + Unpin,
        mpsc::Receiver<tungstenite::Message>,
    ) {
        let (sink_tx, sink_rx) = mpsc::channel::<tungstenite::Message>(16);
        let sink = sink::unfold(sink_tx, |tx, msg: tungstenite::Message| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        });
        (Box::pin(sink), sink_rx)
    }

    #[tokio::test]
    async fn write_pump_forwards_in_order() {
        let (sink, mut out) = capture();
        let (write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(sink, write_rx, CancellationToken::new()));

        write_tx.send(tungstenite::Message::Text("a".into())).await.unwrap();
        write_tx.send(tungstenite::Message::Text("b".into())).await.unwrap();
        drop(write_tx);
        handle.await.unwrap();

        assert_eq!(out.recv().await, Some(tungstenite::Message::Text("a".into())));
        assert_eq!(out.recv().await, Some(tungstenite::Message::Text("b".into())));
        assert!(matches!(out.recv().await, Some(tungstenite::Message::Close(_))));
    }

    #[tokio::test]
    async fn write_pump_stops_on_cancel() {
        let (sink, mut out) = capture();
        let cancel = CancellationToken::new();
        let (_write_tx, write_rx) = mpsc::channel(16);
        let handle = tokio::spawn(write_pump(sink, write_rx, cancel.clone()));

        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
        assert!(matches!(out.recv().await, Some(tungstenite::Message::Close(_))));
    }
}
