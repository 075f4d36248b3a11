//! Configuration management for think-aloud-rs.
//!
//! Loads config from YAML files in standard locations. Every section has
//! defaults, so a missing file (or a partial one) is fine. API credentials
//! are never read from the file; see [`Credentials`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub base_url: String,
    pub model: String,
    pub system_message: String,
    pub api_key_env: String,
    pub connect_timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.groq.com/openai/v1".into(),
            model: "deepseek-r1-distill-llama-70b".into(),
            system_message: "You are a helpful and fun assistant.".into(),
            api_key_env: "GROQ_API_KEY".into(),
            connect_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub base_url: String,
    pub model: String,
    pub voice: String,
    /// Audio container requested from the service; also the artifact extension.
    pub response_format: String,
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "tts-1".into(),
            voice: "onyx".into(),
            response_format: "mp3".into(),
            api_key_env: "OPENAI_API_KEY".into(),
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThinkingConfig {
    pub prompt: String,
    pub continuous: bool,
    pub max_iterations: u32,
    /// Characters of prior thinking carried into the next iteration's prompt.
    pub tail_chars: usize,
    pub open_tag: String,
    pub close_tag: String,
    /// Echo in-block text to stdout as it streams.
    pub echo: bool,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            prompt: "why is the sky blue?".into(),
            continuous: true,
            max_iterations: 3,
            tail_chars: 500,
            open_tag: "<think>".into(),
            close_tag: "</think>".into(),
            echo: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Longest wait for the next queued artifact before re-checking the stop signal.
    pub queue_poll_ms: u64,
    /// Busy-check interval while a clip is playing.
    pub tick_ms: u64,
    /// How long cleanup waits for the playback worker to exit.
    pub join_timeout_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            queue_poll_ms: 1000,
            tick_ms: 100,
            join_timeout_ms: 1000,
        }
    }
}

impl PlaybackConfig {
    pub fn queue_poll(&self) -> Duration {
        Duration::from_millis(self.queue_poll_ms)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    /// Directory for rendered clips. Empty means the system temp dir.
    pub dir: String,
    pub prefix: String,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            dir: String::new(),
            prefix: "thought_".into(),
        }
    }
}

impl ArtifactConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        if self.dir.is_empty() {
            std::env::temp_dir()
        } else {
            PathBuf::from(&self.dir)
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat: ChatConfig,
    pub speech: SpeechConfig,
    pub thinking: ThinkingConfig,
    pub playback: PlaybackConfig,
    pub artifacts: ArtifactConfig,
}

impl Config {
    /// Load configuration from YAML file.
    ///
    /// Searches standard locations if no path is provided:
    /// 1. ./config.yaml
    /// 2. ~/.config/think-aloud/config.yaml
    /// 3. /etc/think-aloud/config.yaml
    pub fn load(path: Option<&Path>) -> Self {
        let resolved = path.map(PathBuf::from).or_else(|| {
            let candidates = [
                std::env::current_dir().ok().map(|d| d.join("config.yaml")),
                dirs::home_dir().map(|h| h.join(".config/think-aloud/config.yaml")),
                Some(PathBuf::from("/etc/think-aloud/config.yaml")),
            ];
            candidates.into_iter().flatten().find(|p| p.exists())
        });

        let Some(config_path) = resolved else {
            info!("No config file found, using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&config_path) {
            Ok(contents) => match Self::from_yaml(&contents) {
                Ok(config) => {
                    info!("Loaded config from {}", config_path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {e}, using defaults", config_path.display());
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read {}: {e}, using defaults", config_path.display());
                Self::default()
            }
        }
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(contents)
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thinking.max_iterations == 0 {
            return Err(ConfigError::Invalid("thinking.max_iterations must be at least 1".into()));
        }
        if self.thinking.open_tag.is_empty() || self.thinking.close_tag.is_empty() {
            return Err(ConfigError::Invalid("thinking block tags must not be empty".into()));
        }
        if self.thinking.open_tag == self.thinking.close_tag {
            return Err(ConfigError::Invalid("thinking open and close tags must differ".into()));
        }
        if self.playback.queue_poll_ms == 0 || self.playback.tick_ms == 0 {
            return Err(ConfigError::Invalid("playback intervals must be non-zero".into()));
        }
        if self.speech.response_format.is_empty() {
            return Err(ConfigError::Invalid("speech.response_format must not be empty".into()));
        }
        Ok(())
    }
}

/// API keys for the chat and speech services, read once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub chat_api_key: String,
    pub speech_api_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

impl Credentials {
    pub fn from_env(config: &Config) -> Result<Self, ConfigError> {
        Self::from_lookup(config, |name| std::env::var(name).ok())
    }

    /// Resolve both keys through `lookup`. Missing or blank values fail.
    pub fn from_lookup<F>(config: &Config, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let fetch = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::MissingCredential(name.to_string()))
        };

        Ok(Self {
            chat_api_key: fetch(&config.chat.api_key_env)?,
            speech_api_key: fetch(&config.speech.api_key_env)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "thinking:\n  prompt: why do cats purr?\n  max_iterations: 5\nspeech:\n  voice: nova\n",
        )
        .unwrap();

        assert_eq!(config.thinking.prompt, "why do cats purr?");
        assert_eq!(config.thinking.max_iterations, 5);
        assert_eq!(config.thinking.tail_chars, 500);
        assert_eq!(config.speech.voice, "nova");
        assert_eq!(config.speech.model, "tts-1");
        assert_eq!(config.chat.model, "deepseek-r1-distill-llama-70b");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_artifact_dir_means_temp_dir() {
        let config = Config::default();
        assert_eq!(config.artifacts.resolved_dir(), std::env::temp_dir());
    }

    #[test]
    fn zero_iterations_rejected() {
        let mut config = Config::default();
        config.thinking.max_iterations = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn identical_tags_rejected() {
        let mut config = Config::default();
        config.thinking.close_tag = config.thinking.open_tag.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_credential_names_the_variable() {
        let config = Config::default();
        let err = Credentials::from_lookup(&config, |name| {
            (name == "GROQ_API_KEY").then(|| "gsk-test".to_string())
        })
        .unwrap_err();

        match err {
            ConfigError::MissingCredential(name) => assert_eq!(name, "OPENAI_API_KEY"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn blank_credential_is_missing() {
        let config = Config::default();
        let result = Credentials::from_lookup(&config, |_| Some("   ".to_string()));
        assert!(matches!(result, Err(ConfigError::MissingCredential(_))));
    }

    #[test]
    fn credentials_resolve() {
        let config = Config::default();
        let creds = Credentials::from_lookup(&config, |name| Some(format!("key-for-{name}"))).unwrap();
        assert_eq!(creds.chat_api_key, "key-for-GROQ_API_KEY");
        assert_eq!(creds.speech_api_key, "key-for-OPENAI_API_KEY");
        assert!(!format!("{creds:?}").contains("key-for"));
    }
}
