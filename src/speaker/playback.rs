//! Strictly ordered clip playback.
//!
//! The controller pushes clips into a [`PlaybackQueue`]; one long-lived
//! [`PlaybackWorker`] thread owns the audio device and plays them one at a
//! time in enqueue order. Every wait on the worker side is bounded so the
//! stop signal is noticed within one poll interval.

use std::collections::VecDeque;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use tracing::{debug, info, warn};

use super::AudioArtifact;
use crate::cancel::StopSignal;
use crate::config::PlaybackConfig;
use crate::error::PlaybackError;

/// An audio device that plays one loaded clip at a time.
pub trait AudioOutput {
    fn load(&mut self, path: &Path) -> Result<(), PlaybackError>;
    fn play(&mut self) -> Result<(), PlaybackError>;
    fn is_busy(&self) -> bool;
    fn stop(&mut self);
}

/// Default output device through rodio.
pub struct RodioOutput {
    // In rodio 0.21, OutputStream is the handle; it must outlive every Sink.
    stream: OutputStream,
    sink: Option<Sink>,
    loaded: Option<Decoder<BufReader<File>>>,
}

impl RodioOutput {
    pub fn open_default() -> Result<Self, PlaybackError> {
        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        Ok(Self {
            stream,
            sink: None,
            loaded: None,
        })
    }
}

impl AudioOutput for RodioOutput {
    fn load(&mut self, path: &Path) -> Result<(), PlaybackError> {
        let file = File::open(path).map_err(|source| PlaybackError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let decoder = Decoder::new(BufReader::new(file)).map_err(|e| PlaybackError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        self.loaded = Some(decoder);
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        let source = self.loaded.take().ok_or(PlaybackError::NothingLoaded)?;
        // rodio 0.21: Sink::connect_new takes &Mixer
        let sink = Sink::connect_new(self.stream.mixer());
        sink.append(source);
        self.sink = Some(sink);
        Ok(())
    }

    fn is_busy(&self) -> bool {
        self.sink.as_ref().is_some_and(|s| !s.empty())
    }

    fn stop(&mut self) {
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
        self.loaded = None;
    }
}

#[derive(Default)]
struct QueueState {
    items: VecDeque<AudioArtifact>,
    /// Enqueued but not yet marked done.
    unfinished: usize,
}

/// Unbounded FIFO with a join barrier, shared by one producer and one consumer.
#[derive(Default)]
pub struct PlaybackQueue {
    state: Mutex<QueueState>,
    available: Condvar,
    finished: Condvar,
}

impl PlaybackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, artifact: AudioArtifact) {
        let mut state = self.lock();
        state.items.push_back(artifact);
        state.unfinished += 1;
        self.available.notify_one();
    }

    /// Wait up to `timeout` for the next clip.
    pub fn next_timeout(&self, timeout: Duration) -> Option<AudioArtifact> {
        let state = self.lock();
        let (mut state, _) = self
            .available
            .wait_timeout_while(state, timeout, |s| s.items.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        state.items.pop_front()
    }

    /// Mark one dequeued clip as fully handled.
    pub fn task_done(&self) {
        let mut state = self.lock();
        state.unfinished = state.unfinished.saturating_sub(1);
        if state.unfinished == 0 {
            self.finished.notify_all();
        }
    }

    /// Block until every enqueued clip is done (`true`) or `stop` is set (`false`).
    pub fn drain(&self, stop: &StopSignal, poll: Duration) -> bool {
        let mut state = self.lock();
        loop {
            if state.unfinished == 0 {
                return true;
            }
            if stop.is_set() {
                return false;
            }
            state = self
                .finished
                .wait_timeout(state, poll)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Clips waiting to be played.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn unfinished(&self) -> usize {
        self.lock().unfinished
    }
}

/// The consumer thread. Owns the audio device for its whole life.
pub struct PlaybackWorker {
    handle: JoinHandle<()>,
}

impl PlaybackWorker {
    /// Start the consumer. `open_device` runs on the worker thread; if it
    /// fails the error is returned here and no worker is left running.
    pub fn spawn<D, F>(
        queue: Arc<PlaybackQueue>,
        stop: StopSignal,
        config: &PlaybackConfig,
        open_device: F,
    ) -> Result<Self, PlaybackError>
    where
        D: AudioOutput,
        F: FnOnce() -> Result<D, PlaybackError> + Send + 'static,
    {
        let poll = config.queue_poll();
        let tick = config.tick();
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();

        let handle = thread::Builder::new()
            .name("playback".into())
            .spawn(move || {
                let mut device = match open_device() {
                    Ok(device) => {
                        let _ = ready_tx.send(Ok(()));
                        device
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                consume(&queue, &stop, &mut device, poll, tick);
                device.stop();
                debug!("Playback worker exiting");
            })
            .map_err(|e| PlaybackError::Worker(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {
                info!("Playback worker started");
                Ok(Self { handle })
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                Err(PlaybackError::Worker("worker exited before opening the device".into()))
            }
        }
    }

    /// Wait at most `timeout` for the worker to exit. Returns whether it was
    /// joined; a worker still running afterwards is detached.
    pub fn join_timeout(self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.handle.is_finished() {
            if Instant::now() >= deadline {
                warn!("Playback worker did not exit within {timeout:?}, detaching");
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        if self.handle.join().is_err() {
            warn!("Playback worker panicked");
        }
        true
    }
}

fn consume<D: AudioOutput>(
    queue: &PlaybackQueue,
    stop: &StopSignal,
    device: &mut D,
    poll: Duration,
    tick: Duration,
) {
    while !stop.is_set() {
        let Some(artifact) = queue.next_timeout(poll) else {
            continue;
        };

        if stop.is_set() {
            queue.task_done();
            break;
        }

        match play_one(device, &artifact.path, stop, tick) {
            Ok(true) => debug!("Played {}", artifact.path.display()),
            Ok(false) => debug!("Playback of {} interrupted", artifact.path.display()),
            Err(e) => warn!("Audio playback error: {e}"),
        }
        queue.task_done();
    }
}

/// Play one clip to completion. `Ok(false)` means the stop signal cut it short.
fn play_one<D: AudioOutput>(
    device: &mut D,
    path: &Path,
    stop: &StopSignal,
    tick: Duration,
) -> Result<bool, PlaybackError> {
    device.load(path)?;
    device.play()?;

    while device.is_busy() {
        if stop.is_set() {
            device.stop();
            return Ok(false);
        }
        thread::sleep(tick);
    }
    Ok(true)
}
