//! Fakes for the three outside collaborators: chat, speech, audio device.

#![allow(dead_code)]

use std::cell::Cell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;

use think_aloud_rs::config::{Config, PlaybackConfig};
use think_aloud_rs::error::{PlaybackError, RenderError, StreamError};
use think_aloud_rs::llm::{ChatStream, FragmentStream};
use think_aloud_rs::pipeline::PipelineContext;
use think_aloud_rs::speaker::playback::AudioOutput;
use think_aloud_rs::speaker::store::FileStore;
use think_aloud_rs::speaker::tts::SpeechSynthesizer;

/// How one scripted completion call behaves.
pub enum Script {
    /// Yield these fragments, then end.
    Fragments(Vec<String>),
    /// Yield these fragments, then never end.
    Stall(Vec<String>),
    /// Yield these fragments, then fail.
    FailAfter(Vec<String>),
    /// Fail before any fragment.
    Refuse,
}

pub fn fragments(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

/// Replays one script per call and records every prompt it was given.
pub struct ScriptedChat {
    scripts: Mutex<VecDeque<Script>>,
    pub prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedChat {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into()),
            prompts: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

#[async_trait]
impl ChatStream for ScriptedChat {
    async fn stream_completion(&self, _system: &str, prompt: &str) -> Result<FragmentStream, StreamError> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Script::Fragments(Vec::new()));

        let ok = |parts: Vec<String>| futures::stream::iter(parts.into_iter().map(Ok::<_, StreamError>));
        Ok(match script {
            Script::Fragments(parts) => ok(parts).boxed(),
            Script::Stall(parts) => ok(parts).chain(futures::stream::pending()).boxed(),
            Script::FailAfter(parts) => ok(parts)
                .chain(futures::stream::once(async {
                    Err(StreamError::Remote("connection reset".into()))
                }))
                .boxed(),
            Script::Refuse => {
                return Err(StreamError::Status {
                    status: 503,
                    body: "over capacity".into(),
                })
            }
        })
    }
}

/// Returns the text itself as "audio"; fails on sentences containing `FAIL`.
#[derive(Clone, Default)]
pub struct EchoSynth {
    pub calls: Arc<Mutex<Vec<String>>>,
    pub delay: Option<Duration>,
}

#[async_trait]
impl SpeechSynthesizer for EchoSynth {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        self.calls.lock().unwrap().push(text.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if text.contains("FAIL") {
            return Err(RenderError::Synthesis("simulated quota error".into()));
        }
        Ok(text.as_bytes().to_vec())
    }
}

/// Records the sentence behind each clip it plays (read from the file).
pub struct RecordingOutput {
    pub played: Arc<Mutex<Vec<String>>>,
    loaded: Option<String>,
    ticks_per_clip: u32,
    remaining: Cell<u32>,
}

impl RecordingOutput {
    pub fn new(ticks_per_clip: u32) -> (Self, Arc<Mutex<Vec<String>>>) {
        let played = Arc::new(Mutex::new(Vec::new()));
        let device = Self {
            played: played.clone(),
            loaded: None,
            ticks_per_clip,
            remaining: Cell::new(0),
        };
        (device, played)
    }
}

impl AudioOutput for RecordingOutput {
    fn load(&mut self, path: &Path) -> Result<(), PlaybackError> {
        let bytes = std::fs::read(path).map_err(|source| PlaybackError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.loaded = Some(String::from_utf8_lossy(&bytes).to_string());
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlaybackError> {
        let text = self.loaded.take().ok_or(PlaybackError::NothingLoaded)?;
        self.played.lock().unwrap().push(text);
        self.remaining.set(self.ticks_per_clip);
        Ok(())
    }

    fn is_busy(&self) -> bool {
        let remaining = self.remaining.get();
        if remaining == 0 {
            return false;
        }
        self.remaining.set(remaining - 1);
        true
    }

    fn stop(&mut self) {
        self.remaining.set(0);
    }
}

/// Config with fast polling, no stdout echo and clips under `dir`.
pub fn test_config(dir: &Path) -> Config {
    let mut config = Config::default();
    config.thinking.echo = false;
    config.playback = PlaybackConfig {
        queue_poll_ms: 20,
        tick_ms: 2,
        join_timeout_ms: 1000,
    };
    config.artifacts.dir = dir.to_string_lossy().to_string();
    config
}

pub fn context(config: &Config) -> PipelineContext {
    PipelineContext::from_config(config)
}

pub fn clip_files(dir: &Path) -> Vec<PathBuf> {
    FileStore::new(dir, "thought_", "mp3").artifacts().unwrap_or_default()
}
