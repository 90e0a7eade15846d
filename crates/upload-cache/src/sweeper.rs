use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::UploadCache;

/// Running background sweep; stop it with [`SweeperHandle::shutdown`]
pub struct SweeperHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub async fn shutdown(self) {
        // Err means the task already ended
        let _ = self.stop.send(());
        let _ = self.task.await;
        info!("upload sweeper stopped");
    }
}

impl<P: Send + Sync + 'static> UploadCache<P> {
    /// Sweep expired entries every `interval` until the handle is shut down
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let cache = Arc::clone(self);
        let (stop, mut stopped) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let removed = cache.sweep().await;
                        debug!(removed, "sweep tick");
                    }
                    _ = &mut stopped => break,
                }
            }
        });

        info!(interval_secs = interval.as_secs(), "upload sweeper started");
        SweeperHandle { stop, task }
    }
}
