//! Remote text-to-speech.
//!
//! Sends one sentence per request to an OpenAI-compatible
//! `/audio/speech` endpoint and returns the encoded clip bytes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tracing::debug;

use crate::config::SpeechConfig;
use crate::error::{ConfigError, RenderError};

/// Turns text into encoded audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, RenderError>;
}

#[derive(Serialize)]
struct SpeechRequest<'a> {
    model: &'a str,
    voice: &'a str,
    input: &'a str,
    response_format: &'a str,
}

pub struct OpenAiSpeechClient {
    config: SpeechConfig,
    api_key: String,
    client: Client,
}

impl OpenAiSpeechClient {
    pub fn new(config: &SpeechConfig, api_key: String) -> Result<Self, ConfigError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(ConfigError::HttpClient)?;

        Ok(Self {
            config: config.clone(),
            api_key,
            client,
        })
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiSpeechClient {
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, RenderError> {
        let url = format!("{}/audio/speech", self.config.base_url.trim_end_matches('/'));
        let body = SpeechRequest {
            model: &self.config.model,
            voice: &self.config.voice,
            input: text,
            response_format: &self.config.response_format,
        };

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RenderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        if bytes.is_empty() {
            return Err(RenderError::EmptyAudio);
        }

        debug!(
            "Synthesized {} bytes of {} for {} chars",
            bytes.len(),
            self.config.response_format,
            text.len()
        );
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_shape() {
        let body = SpeechRequest {
            model: "tts-1",
            voice: "onyx",
            input: "Hello.",
            response_format: "mp3",
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "tts-1",
                "voice": "onyx",
                "input": "Hello.",
                "response_format": "mp3"
            })
        );
    }

    #[test]
    fn client_builds_from_defaults() {
        assert!(OpenAiSpeechClient::new(&SpeechConfig::default(), "sk-test".into()).is_ok());
    }
}
