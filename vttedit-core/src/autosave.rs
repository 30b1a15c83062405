//! Background saver that persists document snapshots in the order they were issued.
//!
//! Every edit hands a full snapshot to the queue. Snapshots are never
//! merged or dropped, and a single task writes them one after another, so the
//! last edit issued is always the last one written.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::storage::PersistenceGateway;
use crate::vtt::Cue;

enum SaveRequest {
    Save { filename: String, cues: Vec<Cue> },
    Flush(oneshot::Sender<()>),
}

/// Sending side of the save queue
#[derive(Clone)]
pub struct AutosaveHandle {
    tx: mpsc::UnboundedSender<SaveRequest>,
}

impl AutosaveHandle {
    /// Queue a snapshot of `cues` for `filename`
    pub fn save(&self, filename: impl Into<String>, cues: Vec<Cue>) {
        let filename = filename.into();
        if self
            .tx
            .send(SaveRequest::Save {
                filename: filename.clone(),
                cues,
            })
            .is_err()
        {
            warn!("Autosaver has stopped, edit to {} was not saved", filename);
        }
    }

    /// Wait until every snapshot queued so far has been written
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(SaveRequest::Flush(done_tx)).is_err() {
            return;
        }
        // A closed channel means the saver already drained and exited
        let _ = done_rx.await;
    }
}

/// Receiving side of the save queue
pub struct Autosaver {
    gateway: Arc<PersistenceGateway>,
    rx: mpsc::UnboundedReceiver<SaveRequest>,
    cancel_token: CancellationToken,
}

impl Autosaver {
    /// Create a saver and its handle
    ///
    /// # Arguments
    /// * `gateway` - Where snapshots are written
    /// * `cancel_token` - Optional external cancellation token for graceful shutdown
    #[must_use]
    pub fn new(
        gateway: Arc<PersistenceGateway>,
        cancel_token: Option<CancellationToken>,
    ) -> (Self, AutosaveHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let saver = Self {
            gateway,
            rx,
            cancel_token: cancel_token.unwrap_or_default(),
        };
        (saver, AutosaveHandle { tx })
    }

    /// Get a clone of the cancellation token
    #[must_use]
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Start the saver in a background task
    #[must_use]
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the save loop until cancelled or every handle is dropped
    async fn run(mut self) {
        debug!("Autosaver started");

        loop {
            tokio::select! {
                biased;
                () = self.cancel_token.cancelled() => {
                    // Saves in flight are never cancelled, finish what was queued
                    self.rx.close();
                    while let Some(request) = self.rx.recv().await {
                        self.handle(request).await;
                    }
                    info!("Autosaver shutting down");
                    break;
                }
                request = self.rx.recv() => {
                    match request {
                        Some(request) => self.handle(request).await,
                        None => break,
                    }
                }
            }
        }
    }

    async fn handle(&self, request: SaveRequest) {
        match request {
            SaveRequest::Save { filename, cues } => {
                self.gateway.save(&filename, cues).await;
            }
            SaveRequest::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{BlobBackend, MemoryStringStore, StorageBackend};

    fn gateway() -> Arc<PersistenceGateway> {
        let blob: Arc<dyn StorageBackend> = Arc::new(BlobBackend::new(MemoryStringStore::new()));
        Arc::new(PersistenceGateway::new(vec![blob]))
    }

    fn cue(text: &str) -> Cue {
        Cue::new("", "00:00:01.000", "00:00:02.000", text)
    }

    #[tokio::test]
    async fn test_last_issued_snapshot_wins() {
        let gateway = gateway();
        let (saver, handle) = Autosaver::new(gateway.clone(), None);
        let task = saver.start();

        for i in 0..50 {
            handle.save("a.vtt", vec![cue(&format!("edit {i}"))]);
        }
        handle.flush().await;

        let record = gateway.load("a.vtt").await.unwrap();
        assert_eq!(record.cues, vec![cue("edit 49")]);

        drop(handle);
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancel_drains_queued_saves() {
        let gateway = gateway();
        let (saver, handle) = Autosaver::new(gateway.clone(), None);
        let token = saver.cancel_token();

        handle.save("a.vtt", vec![cue("first")]);
        handle.save("a.vtt", vec![cue("queued before shutdown")]);
        token.cancel();

        saver.start().await.unwrap();

        let record = gateway.load("a.vtt").await.unwrap();
        assert_eq!(record.cues, vec![cue("queued before shutdown")]);

        // Flushing a stopped saver returns instead of hanging
        handle.flush().await;
    }
}
