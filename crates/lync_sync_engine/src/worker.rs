//! Background task driving periodic and on-demand syncs.

use crate::state::SyncEngine;
use crate::transport::RemoteTransport;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// Runs [`SyncEngine::sync`] on a fixed interval and whenever woken.
///
/// Both triggers go through the engine's drain guard, so a wake-up that
/// arrives during a drain never causes overlapping deliveries.
#[derive(Debug)]
pub struct SyncWorker {
    wake: Arc<Notify>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Spawns the worker on the current tokio runtime.
    ///
    /// The first sync runs immediately.
    pub fn spawn<T>(engine: Arc<SyncEngine<T>>, interval: Duration, wake: Arc<Notify>) -> Self
    where
        T: RemoteTransport + ?Sized + 'static,
    {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let wake_rx = Arc::clone(&wake);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = &mut shutdown_rx => {
                        debug!("sync worker shutting down");
                        break;
                    }
                    _ = ticker.tick() => {}
                    _ = wake_rx.notified() => {}
                }
                engine.sync().await;
            }
        });

        Self {
            wake,
            shutdown: Some(shutdown_tx),
            handle,
        }
    }

    /// Requests a sync as soon as possible.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    /// Returns true once the task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Stops the worker and waits for the running sync, if any, to finish.
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            warn!(error = %e, "sync worker ended abnormally");
        }
    }
}
