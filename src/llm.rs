//! Streaming chat completions (Groq / any OpenAI-compatible endpoint).
//!
//! POSTs to `/chat/completions` with `stream: true` and turns the
//! server-sent-event body into a stream of content deltas.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ChatConfig;
use crate::error::{ConfigError, StreamError};

/// Content deltas in arrival order. Finite; not restartable.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, StreamError>> + Send>>;

#[async_trait]
pub trait ChatStream: Send + Sync {
    async fn stream_completion(&self, system: &str, prompt: &str) -> Result<FragmentStream, StreamError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [Message<'a>; 2],
    stream: bool,
}

#[derive(Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    error: Option<ChunkError>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChunkError {
    message: String,
}

/// One decoded `data:` event.
#[derive(Debug, PartialEq, Eq)]
enum StreamEvent {
    Content(String),
    Empty,
    Done,
}

fn parse_event(data: &str) -> Result<StreamEvent, StreamError> {
    if data == "[DONE]" {
        return Ok(StreamEvent::Done);
    }

    let payload: ChunkPayload = serde_json::from_str(data)?;
    if let Some(err) = payload.error {
        return Err(StreamError::Remote(err.message));
    }

    Ok(payload
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty())
        .map_or(StreamEvent::Empty, StreamEvent::Content))
}

/// Incremental splitter for a `text/event-stream` body.
///
/// Network chunks may end mid-line (or mid-UTF-8 sequence); only complete
/// lines are decoded.
#[derive(Debug, Default)]
struct SseDecoder {
    buf: Vec<u8>,
}

impl SseDecoder {
    /// Feed raw bytes, get back the payload of every completed `data:` line.
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buf.extend_from_slice(chunk);

        let mut events = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(&['\n', '\r'][..]);
            if let Some(data) = line.strip_prefix("data:") {
                events.push(data.trim_start().to_string());
            }
        }
        events
    }
}

pub struct GroqChatClient {
    config: ChatConfig,
    api_key: String,
    client: Client,
}

impl GroqChatClient {
    pub fn new(config: &ChatConfig, api_key: String) -> Result<Self, ConfigError> {
        // No overall timeout: a thinking stream can legitimately run for minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
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
impl ChatStream for GroqChatClient {
    async fn stream_completion(&self, system: &str, prompt: &str) -> Result<FragmentStream, StreamError> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.config.model,
            messages: [
                Message {
                    role: "system",
                    content: system,
                },
                Message {
                    role: "user",
                    content: prompt,
                },
            ],
            stream: true,
        };

        debug!("Streaming completion from model '{}'", self.config.model);
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
            return Err(StreamError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(content_stream(resp.bytes_stream())))
    }
}

/// Decode a raw event-stream body into content deltas, ending at `[DONE]`.
fn content_stream<S, B>(body: S) -> impl Stream<Item = Result<String, StreamError>> + Send
where
    S: Stream<Item = Result<B, reqwest::Error>> + Send + 'static,
    B: AsRef<[u8]> + Send,
{
    async_stream::try_stream! {
        let mut body = Box::pin(body);
        let mut decoder = SseDecoder::default();
        'read: while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(StreamError::from)?;
            for data in decoder.push(chunk.as_ref()) {
                match parse_event(&data)? {
                    StreamEvent::Content(text) => {
                        yield text;
                    }
                    StreamEvent::Empty => {}
                    StreamEvent::Done => break 'read,
                }
            }
        }
    }
}
