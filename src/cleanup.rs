//! End-of-run teardown: stop playback, reap the worker, delete clips.
//!
//! Runs on every exit path. Nothing in here returns an error.

use std::time::Duration;

use tracing::{info, warn};

use crate::cancel::StopSignal;
use crate::pipeline::PipelineContext;
use crate::speaker::playback::PlaybackWorker;
use crate::speaker::store::FileStore;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CleanupReport {
    pub worker_joined: bool,
    pub removed: usize,
    pub failed: usize,
}

pub struct CleanupManager {
    stop: StopSignal,
    store: FileStore,
    join_timeout: Duration,
}

impl CleanupManager {
    pub fn new(ctx: &PipelineContext) -> Self {
        Self {
            stop: ctx.stop.clone(),
            store: ctx.store.clone(),
            join_timeout: ctx.playback.join_timeout(),
        }
    }

    pub async fn finish(self, worker: PlaybackWorker) -> CleanupReport {
        // The worker stops and releases the device on its way out.
        self.stop.set();

        let timeout = self.join_timeout;
        let worker_joined = match tokio::task::spawn_blocking(move || worker.join_timeout(timeout)).await {
            Ok(joined) => joined,
            Err(e) => {
                warn!("Failed to wait for playback worker: {e}");
                false
            }
        };

        let purged = self.store.purge();
        if purged.removed > 0 || purged.failed > 0 {
            info!(
                "Cleaned up {} clip(s) in {} ({} failed)",
                purged.removed,
                self.store.dir().display(),
                purged.failed
            );
        }

        CleanupReport {
            worker_joined,
            removed: purged.removed,
            failed: purged.failed,
        }
    }
}
