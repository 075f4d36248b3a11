//! think-aloud-rs: hear a reasoning model think, sentence by sentence.
//!
//! Streams a model's `<think>` block, cuts it into sentences, renders each
//! one to speech and plays the clips in order while the stream continues.

pub mod cancel;
pub mod cleanup;
pub mod config;
pub mod controller;
pub mod error;
pub mod llm;
pub mod pipeline;
pub mod segmenter;
pub mod speaker;
pub mod think_block;
