//! Turns upload events into log lines.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use darkroom_transfer::SpeedCalculator;
use darkroom_uploader::UploadEvent;

/// Running totals over one process lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Totals {
    pub batches: usize,
    pub completed: usize,
    pub failed: usize,
    pub bytes: u64,
}

/// Accumulates events and logs throughput.
#[derive(Default)]
pub struct Reporter {
    totals: Totals,
    // Last cumulative byte count seen per upload.
    sent: HashMap<String, u64>,
    speed: SpeedCalculator,
}

impl Reporter {
    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn record(&mut self, event: UploadEvent) {
        match event {
            UploadEvent::BatchStarted { index, count, size } => {
                // A first batch means a new drain; stale samples would skew it.
                if index == 0 {
                    self.speed.reset();
                }
                self.totals.batches += 1;
                info!(batch = index + 1, of = count, uploads = size, "batch started");
            }
            UploadEvent::Progress {
                id,
                percent,
                uploaded_bytes,
                total_bytes,
            } => {
                let previous = self.sent.insert(id.clone(), uploaded_bytes).unwrap_or(0);
                let delta = uploaded_bytes.saturating_sub(previous);
                self.totals.bytes += delta;
                self.speed.add_sample(delta);
                let eta_secs = self
                    .speed
                    .eta(total_bytes.saturating_sub(uploaded_bytes))
                    .map(|d| d.as_secs());
                debug!(
                    %id,
                    percent,
                    uploaded_bytes,
                    total_bytes,
                    bytes_per_sec = self.speed.bytes_per_second() as u64,
                    eta_secs = ?eta_secs,
                    "progress"
                );
            }
            UploadEvent::Completed { id } => {
                self.sent.remove(&id);
                self.totals.completed += 1;
                info!(%id, "upload confirmed");
            }
            UploadEvent::Failed { id, error } => {
                self.sent.remove(&id);
                self.totals.failed += 1;
                warn!(%id, %error, "upload failed; it stays queued");
            }
        }
    }

    /// Consumes events until the session's channel closes.
    pub async fn run(mut self, mut rx: mpsc::Receiver<UploadEvent>) -> Totals {
        while let Some(event) = rx.recv().await {
            self.record(event);
        }
        self.totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(id: &str, uploaded: u64) -> UploadEvent {
        UploadEvent::Progress {
            id: id.into(),
            percent: 0,
            uploaded_bytes: uploaded,
            total_bytes: 100,
        }
    }

    #[test]
    fn counts_bytes_once_per_upload() {
        let mut reporter = Reporter::default();
        reporter.record(progress("a", 40));
        reporter.record(progress("b", 10));
        reporter.record(progress("a", 100));
        reporter.record(UploadEvent::Completed { id: "a".into() });
        reporter.record(UploadEvent::Failed {
            id: "b".into(),
            error: "503".into(),
        });

        assert_eq!(
            reporter.totals(),
            &Totals {
                batches: 0,
                completed: 1,
                failed: 1,
                bytes: 110,
            }
        );
    }

    #[test]
    fn restarted_upload_does_not_go_negative() {
        let mut reporter = Reporter::default();
        reporter.record(progress("a", 80));
        reporter.record(UploadEvent::Failed {
            id: "a".into(),
            error: "cancelled".into(),
        });
        reporter.record(progress("a", 20));
        assert_eq!(reporter.totals().bytes, 100);
    }

    #[tokio::test]
    async fn run_ends_when_channel_closes() {
        let (tx, rx) = mpsc::channel(8);
        let handle = tokio::spawn(Reporter::default().run(rx));
        tx.send(UploadEvent::BatchStarted {
            index: 0,
            count: 1,
            size: 2,
        })
        .await
        .unwrap();
        drop(tx);
        let totals = handle.await.unwrap();
        assert_eq!(totals.batches, 1);
    }
}
