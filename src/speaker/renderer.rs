//! Sentence → clip on disk, at most one synthesis call per distinct sentence.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use tracing::{debug, info};

use super::store::FileStore;
use super::tts::SpeechSynthesizer;
use super::AudioArtifact;
use crate::cancel::StopSignal;
use crate::error::RenderError;

pub struct SpeechRenderer<S> {
    synth: S,
    store: FileStore,
    synthesized: AtomicUsize,
    cache_hits: AtomicUsize,
}

impl<S: SpeechSynthesizer> SpeechRenderer<S> {
    pub fn new(synth: S, store: FileStore) -> Self {
        Self {
            synth,
            store,
            synthesized: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
        }
    }

    /// Number of remote synthesis calls made so far.
    pub fn synthesized(&self) -> usize {
        self.synthesized.load(Ordering::Relaxed)
    }

    pub fn cache_hits(&self) -> usize {
        self.cache_hits.load(Ordering::Relaxed)
    }

    /// Render `sentence`, reusing an existing clip for the same text.
    ///
    /// Only the synthesis call is raced against `stop`; `Ok(None)` means the
    /// signal won and nothing was written. Once audio is in hand the clip is
    /// always persisted before returning, so cleanup after this call sees it.
    pub async fn render(&self, sentence: &str, stop: &StopSignal) -> Result<Option<AudioArtifact>, RenderError> {
        let path = self.store.path_for(sentence);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            self.cache_hits.fetch_add(1, Ordering::Relaxed);
            debug!("Clip cache hit: {}", path.display());
            return Ok(Some(AudioArtifact::new(path, sentence)));
        }

        let t0 = Instant::now();
        self.synthesized.fetch_add(1, Ordering::Relaxed);
        let audio = tokio::select! {
            biased;
            _ = stop.stopped() => return Ok(None),
            audio = self.synth.synthesize(sentence) => audio?,
        };
        if audio.is_empty() {
            return Err(RenderError::EmptyAudio);
        }

        self.store
            .write_atomic(&path, audio)
            .await
            .map_err(|source| RenderError::Io {
                path: path.clone(),
                source,
            })?;

        let preview: String = sentence.chars().take(60).collect();
        info!(
            "Rendered \"{preview}{}\" in {:.0}ms",
            if sentence.chars().count() > 60 { "..." } else { "" },
            t0.elapsed().as_secs_f64() * 1000.0
        );
        Ok(Some(AudioArtifact::new(path, sentence)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct CountingSynth {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl SpeechSynthesizer for CountingSynth {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, RenderError> {
            self.calls.lock().unwrap().push(text.to_string());
            Ok(format!("audio:{text}").into_bytes())
        }
    }

    struct FailingSynth;

    #[async_trait]
    impl SpeechSynthesizer for FailingSynth {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, RenderError> {
            Err(RenderError::Synthesis("quota exceeded".into()))
        }
    }

    struct SilentSynth;

    #[async_trait]
    impl SpeechSynthesizer for SilentSynth {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, RenderError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn second_render_hits_cache() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SpeechRenderer::new(
            CountingSynth::default(),
            FileStore::new(dir.path(), "thought_", "mp3"),
        );

        let stop = StopSignal::new();
        let first = renderer.render("The sky is blue.", &stop).await.unwrap().unwrap();
        let second = renderer.render("The sky is blue.", &stop).await.unwrap().unwrap();

        assert_eq!(first.path, second.path);
        assert_eq!(renderer.synthesized(), 1);
        assert_eq!(renderer.cache_hits(), 1);
        assert_eq!(
            std::fs::read(&first.path).unwrap(),
            b"audio:The sky is blue."
        );
    }

    #[tokio::test]
    async fn distinct_sentences_get_distinct_clips() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SpeechRenderer::new(
            CountingSynth::default(),
            FileStore::new(dir.path(), "thought_", "mp3"),
        );

        let stop = StopSignal::new();
        let a = renderer.render("One.", &stop).await.unwrap().unwrap();
        let b = renderer.render("Two.", &stop).await.unwrap().unwrap();
        assert_ne!(a.path, b.path);
        assert_eq!(renderer.synthesized(), 2);
    }

    #[tokio::test]
    async fn synthesis_failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "thought_", "mp3");
        let renderer = SpeechRenderer::new(FailingSynth, store.clone());

        let err = renderer.render("Doomed.", &StopSignal::new()).await.unwrap_err();
        assert!(matches!(err, RenderError::Synthesis(_)));
        assert!(store.artifacts().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_audio_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = SpeechRenderer::new(SilentSynth, FileStore::new(dir.path(), "thought_", "mp3"));
        assert!(matches!(
            renderer.render("Quiet.", &StopSignal::new()).await,
            Err(RenderError::EmptyAudio)
        ));
    }

    struct StuckSynth;

    #[async_trait]
    impl SpeechSynthesizer for StuckSynth {
        async fn synthesize(&self, _text: &str) -> Result<Vec<u8>, RenderError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn stop_abandons_synthesis_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), "thought_", "mp3");
        let renderer = SpeechRenderer::new(StuckSynth, store.clone());
        let stop = StopSignal::new();
        let setter = stop.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            setter.set();
        });

        let rendered = tokio::time::timeout(Duration::from_secs(2), renderer.render("Stuck.", &stop))
            .await
            .expect("render should give up once stopped");
        assert!(matches!(rendered, Ok(None)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
