//! Error types, one enum per failure domain.
//!
//! Only [`ConfigError`] and [`StreamError`] ever end a run. Render and
//! playback failures are per-sentence and get logged where they happen.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingCredential(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("chat request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("chat service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed stream event: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("chat service reported an error: {0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("speech request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("speech service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("speech service returned no audio")]
    EmptyAudio,
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("synthesis failed: {0}")]
    Synthesis(String),
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    Device(String),
    #[error("failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },
    #[error("play called with nothing loaded")]
    NothingLoaded,
    #[error("playback worker: {0}")]
    Worker(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Stream(#[from] StreamError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
}
