//! Thinking stream controller: token stream → sentences → clips → queue.
//!
//! One iteration streams a completion, speaks every sentence of the
//! thinking block as soon as it is complete, then waits for playback to
//! catch up. In continuous mode the tail of everything thought so far seeds
//! the next iteration's prompt.

use std::io::Write;

use futures::StreamExt;
use tracing::{debug, info, warn};

use crate::config::ThinkingConfig;
use crate::error::StreamError;
use crate::llm::ChatStream;
use crate::pipeline::PipelineContext;
use crate::segmenter::SentenceSegmenter;
use crate::speaker::renderer::SpeechRenderer;
use crate::speaker::tts::SpeechSynthesizer;
use crate::think_block::{BlockState, ThinkBlockScanner};

const DEEPER_THINKING_PROMPT: &str = r#"Earlier you were thinking about {original_prompt}. Let's wander off the obvious path and look for surprising connections.

Some directions you could take:
- Parallels with other fields or natural phenomena
- Philosophical or metaphysical implications
- Analogies and metaphors
- Links to art, music, literature or culture
- Historical or futuristic angles
- What it says about human psychology or behaviour
- Paradoxes and counterintuitive aspects

Where your thoughts left off: {previous_thinking}

Now take us somewhere unexpected..."#;

/// Prompt for a follow-up iteration.
pub fn deeper_prompt(original_prompt: &str, previous_thinking: &str) -> String {
    DEEPER_THINKING_PROMPT
        .replace("{original_prompt}", original_prompt)
        .replace("{previous_thinking}", previous_thinking)
}

/// Last `n` characters of `text`, trimmed.
pub fn thinking_tail(text: &str, n: usize) -> String {
    let total = text.chars().count();
    let tail: String = text.chars().skip(total.saturating_sub(n)).collect();
    tail.trim().to_string()
}

#[derive(Debug, Clone)]
pub struct IterationContext {
    /// 1-based.
    pub iteration: u32,
    pub max_iterations: u32,
    pub original_prompt: String,
    pub thinking_tail: String,
}

impl IterationContext {
    pub fn first(original_prompt: &str, max_iterations: u32) -> Self {
        Self {
            iteration: 1,
            max_iterations,
            original_prompt: original_prompt.to_string(),
            thinking_tail: String::new(),
        }
    }

    pub fn next(&self, thinking_tail: String) -> Self {
        Self {
            iteration: self.iteration + 1,
            max_iterations: self.max_iterations,
            original_prompt: self.original_prompt.clone(),
            thinking_tail,
        }
    }

    pub fn prompt(&self) -> String {
        if self.iteration == 1 {
            self.original_prompt.clone()
        } else {
            deeper_prompt(&self.original_prompt, &self.thinking_tail)
        }
    }

    pub fn is_last(&self) -> bool {
        self.iteration >= self.max_iterations
    }
}

/// What a whole run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Iterations started (the last one may have been cut short).
    pub iterations: u32,
    pub sentences_queued: usize,
    pub sentences_skipped: usize,
    pub cancelled: bool,
}

#[derive(Debug, Default)]
struct IterationReport {
    thinking: String,
    queued: usize,
    skipped: usize,
    cancelled: bool,
}

pub struct ThinkingStreamController<C, S> {
    chat: C,
    renderer: SpeechRenderer<S>,
    ctx: PipelineContext,
    settings: ThinkingConfig,
    system_message: String,
}

impl<C: ChatStream, S: SpeechSynthesizer> ThinkingStreamController<C, S> {
    pub fn new(
        chat: C,
        renderer: SpeechRenderer<S>,
        ctx: PipelineContext,
        settings: ThinkingConfig,
        system_message: &str,
    ) -> Self {
        Self {
            chat,
            renderer,
            ctx,
            settings,
            system_message: system_message.to_string(),
        }
    }

    pub fn renderer(&self) -> &SpeechRenderer<S> {
        &self.renderer
    }

    /// Run every iteration. Cancellation is reported in the summary, not as
    /// an error; a stream failure ends the run.
    pub async fn run(&self) -> Result<RunSummary, StreamError> {
        let max_iterations = if self.settings.continuous {
            self.settings.max_iterations.max(1)
        } else {
            1
        };
        let mut iteration = IterationContext::first(&self.settings.prompt, max_iterations);
        let mut all_thinking = String::new();
        let mut summary = RunSummary::default();

        loop {
            info!(
                "[{}/{}] Calling chat service (streaming with audio)",
                iteration.iteration, iteration.max_iterations
            );
            summary.iterations = iteration.iteration;

            let report = self.run_iteration(&iteration).await?;
            summary.sentences_queued += report.queued;
            summary.sentences_skipped += report.skipped;
            all_thinking.push_str(&report.thinking);

            if report.cancelled || !self.wait_for_playback().await {
                summary.cancelled = true;
                break;
            }

            if iteration.is_last() {
                info!("Thinking process complete");
                break;
            }
            if self.ctx.stop.is_set() {
                summary.cancelled = true;
                break;
            }

            info!("Preparing for deeper analysis...");
            iteration = iteration.next(thinking_tail(&all_thinking, self.settings.tail_chars));
        }

        if summary.cancelled {
            info!("Run cancelled during iteration {}", summary.iterations);
        }
        Ok(summary)
    }

    async fn run_iteration(&self, iteration: &IterationContext) -> Result<IterationReport, StreamError> {
        let stop = &self.ctx.stop;
        let mut report = IterationReport::default();

        let prompt = iteration.prompt();
        debug!("Iteration {} prompt: {prompt}", iteration.iteration);

        let mut stream = tokio::select! {
            biased;
            _ = stop.stopped() => {
                report.cancelled = true;
                return Ok(report);
            }
            result = self.chat.stream_completion(&self.system_message, &prompt) => result?,
        };

        let mut scanner = ThinkBlockScanner::new(&self.settings.open_tag, &self.settings.close_tag);
        let mut segmenter = SentenceSegmenter::new();

        loop {
            let fragment = tokio::select! {
                biased;
                _ = stop.stopped() => {
                    report.cancelled = true;
                    break;
                }
                next = stream.next() => match next {
                    Some(fragment) => fragment?,
                    None => break,
                },
            };

            let scanned = scanner.push(&fragment);
            self.absorb(&scanned.thinking, &mut segmenter, &mut report).await;

            if scanned.closed {
                if let Some(last) = segmenter.finish() {
                    self.speak(last, &mut report).await;
                }
                break;
            }
        }

        // Stream ran out mid-block: treat the end of stream as the close tag.
        if !report.cancelled && scanner.state() == BlockState::InsideThink {
            debug!("Stream ended inside the thinking block");
            let rest = scanner.finish();
            self.absorb(&rest, &mut segmenter, &mut report).await;
            if let Some(last) = segmenter.finish() {
                self.speak(last, &mut report).await;
            }
        }

        if self.settings.echo {
            println!();
        }
        if stop.is_set() {
            report.cancelled = true;
        }
        Ok(report)
    }

    async fn absorb(&self, text: &str, segmenter: &mut SentenceSegmenter, report: &mut IterationReport) {
        if text.is_empty() {
            return;
        }
        if self.settings.echo {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        for sentence in segmenter.feed(text) {
            self.speak(sentence, report).await;
        }
    }

    /// Render one sentence and queue it. Failures skip the sentence.
    async fn speak(&self, sentence: String, report: &mut IterationReport) {
        report.thinking.push_str(&sentence);
        report.thinking.push(' ');

        let stop = &self.ctx.stop;
        if stop.is_set() {
            return;
        }

        match self.renderer.render(&sentence, stop).await {
            Ok(Some(artifact)) if !stop.is_set() => {
                self.ctx.queue.enqueue(artifact);
                report.queued += 1;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("TTS error, skipping sentence: {e}");
                report.skipped += 1;
            }
        }
    }

    /// Block until the queue is drained. `false` if the stop signal won.
    async fn wait_for_playback(&self) -> bool {
        let queue = self.ctx.queue.clone();
        let stop = self.ctx.stop.clone();
        let poll = self.ctx.playback.queue_poll();

        match tokio::task::spawn_blocking(move || queue.drain(&stop, poll)).await {
            Ok(drained) => drained,
            Err(e) => {
                warn!("Playback drain task failed: {e}");
                false
            }
        }
    }
}
