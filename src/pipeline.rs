//! One run of the think-aloud pipeline.
//!
//! Wires the playback worker, the controller and cleanup together around a
//! [`PipelineContext`]. Each run gets its own context, so independent
//! pipelines never share a queue or a stop signal.

use std::sync::Arc;

use tracing::{error, info};

use crate::cancel::StopSignal;
use crate::cleanup::CleanupManager;
use crate::config::{Config, PlaybackConfig};
use crate::controller::{RunSummary, ThinkingStreamController};
use crate::error::{PipelineError, PlaybackError};
use crate::llm::ChatStream;
use crate::speaker::playback::{AudioOutput, PlaybackQueue, PlaybackWorker};
use crate::speaker::renderer::SpeechRenderer;
use crate::speaker::store::FileStore;
use crate::speaker::tts::SpeechSynthesizer;

/// State shared by every component of a single run.
#[derive(Clone)]
pub struct PipelineContext {
    pub stop: StopSignal,
    pub queue: Arc<PlaybackQueue>,
    pub store: FileStore,
    pub playback: PlaybackConfig,
}

impl PipelineContext {
    pub fn new(store: FileStore, playback: PlaybackConfig) -> Self {
        Self {
            stop: StopSignal::new(),
            queue: Arc::new(PlaybackQueue::new()),
            store,
            playback,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let store = FileStore::new(
            config.artifacts.resolved_dir(),
            &config.artifacts.prefix,
            &config.speech.response_format,
        );
        Self::new(store, config.playback.clone())
    }
}

/// Run every iteration, then tear down. Cleanup happens whether the
/// controller finished, was cancelled or failed.
pub async fn run<C, S, D, F>(
    config: &Config,
    ctx: PipelineContext,
    chat: C,
    synth: S,
    open_device: F,
) -> Result<RunSummary, PipelineError>
where
    C: ChatStream,
    S: SpeechSynthesizer,
    D: AudioOutput,
    F: FnOnce() -> Result<D, PlaybackError> + Send + 'static,
{
    // Opening the device blocks until the worker reports back.
    let (queue, stop, playback) = (ctx.queue.clone(), ctx.stop.clone(), ctx.playback.clone());
    let worker = tokio::task::spawn_blocking(move || PlaybackWorker::spawn(queue, stop, &playback, open_device))
        .await
        .map_err(|e| PlaybackError::Worker(e.to_string()))??;

    let renderer = SpeechRenderer::new(synth, ctx.store.clone());
    let controller = ThinkingStreamController::new(
        chat,
        renderer,
        ctx.clone(),
        config.thinking.clone(),
        &config.chat.system_message,
    );

    let result = controller.run().await;

    let renderer = controller.renderer();
    info!(
        "Synthesized {} clip(s), {} cache hit(s)",
        renderer.synthesized(),
        renderer.cache_hits()
    );

    let cleanup = CleanupManager::new(&ctx).finish(worker).await;
    if !cleanup.worker_joined {
        error!("Playback worker was still running after cleanup");
    }

    Ok(result?)
}
