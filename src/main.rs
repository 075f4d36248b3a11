//! think-aloud-rs: speak a reasoning model's thoughts as they stream.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use think_aloud_rs::cancel::StopSignal;
use think_aloud_rs::config::{Config, Credentials};
use think_aloud_rs::error::PipelineError;
use think_aloud_rs::llm::GroqChatClient;
use think_aloud_rs::pipeline::{self, PipelineContext};
use think_aloud_rs::speaker::playback::RodioOutput;
use think_aloud_rs::speaker::tts::OpenAiSpeechClient;

#[derive(Parser, Debug)]
#[command(name = "think-aloud-rs", about = "Listen to a reasoning model think out loud")]
struct Args {
    /// Path to config.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Question to think about (overrides thinking.prompt)
    #[arg(short, long)]
    prompt: Option<String>,

    /// Number of thinking iterations (overrides thinking.max_iterations)
    #[arg(short, long)]
    iterations: Option<u32>,

    /// Run a single iteration only
    #[arg(long)]
    once: bool,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Logs go to stderr so streamed thoughts on stdout stay readable.
    let filter = if args.verbose {
        EnvFilter::new("debug,hyper_util=info,reqwest=info,rustls=info")
    } else {
        EnvFilter::new("info,hyper_util=warn,reqwest=warn,rustls=warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), PipelineError> {
    let mut config = Config::load(args.config.as_deref());
    if let Some(prompt) = args.prompt {
        config.thinking.prompt = prompt;
    }
    if let Some(iterations) = args.iterations {
        config.thinking.max_iterations = iterations;
    }
    if args.once {
        config.thinking.continuous = false;
    }
    config.validate()?;

    let credentials = Credentials::from_env(&config)?;
    let chat = GroqChatClient::new(&config.chat, credentials.chat_api_key)?;
    let speech = OpenAiSpeechClient::new(&config.speech, credentials.speech_api_key)?;

    info!(
        "think-aloud-rs starting (model: {}, voice: {}, prompt: {:?})",
        config.chat.model, config.speech.voice, config.thinking.prompt
    );

    let ctx = PipelineContext::from_config(&config);
    forward_shutdown_signals(ctx.stop.clone());

    let summary = pipeline::run(&config, ctx, chat, speech, RodioOutput::open_default).await?;

    if summary.cancelled {
        warn!("Interrupted by user after {} iteration(s)", summary.iterations);
    } else {
        info!(
            "Done: {} iteration(s), {} sentence(s) spoken, {} skipped",
            summary.iterations, summary.sentences_queued, summary.sentences_skipped
        );
    }
    Ok(())
}

/// Turn SIGINT/SIGTERM into a cooperative stop.
fn forward_shutdown_signals(stop: StopSignal) {
    tokio::spawn(async move {
        wait_for_shutdown().await;
        warn!("Stopping audio playback and cleaning up...");
        stop.set();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {e}");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = terminate.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown() {
    let _ = tokio::signal::ctrl_c().await;
}
