//! Speaker: sentences in, sound out.
//!
//! Components:
//! - `tts`: remote text-to-speech client
//! - `store`: transient clip files keyed by sentence hash
//! - `renderer`: sentence → cached clip on disk
//! - `playback`: ordered queue + single consumer thread on the audio device

pub mod playback;
pub mod renderer;
pub mod store;
pub mod tts;

use std::path::PathBuf;

/// A rendered clip of exactly one sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioArtifact {
    pub path: PathBuf,
    pub sentence: String,
}

impl AudioArtifact {
    pub fn new(path: PathBuf, sentence: &str) -> Self {
        Self {
            path,
            sentence: sentence.to_string(),
        }
    }
}
