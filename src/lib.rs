//! Voxline: streaming voice-agent pipeline
//!
//! Turns a stream of raw client audio into one ordered stream of
//! [`VoiceEvent`](types::VoiceEvent)s: transcripts from a speech recognizer,
//! assistant text and tool activity from a conversational agent, and audio
//! from a speech synthesizer. The three collaborators are traits; the crate
//! composes them, keeps per-turn ordering, and closes every connection
//! exactly once however the pipeline ends.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use futures::StreamExt;
//! use voxline::prelude::*;
//!
//! # async fn example(
//! #     recognizer: Arc<dyn Recognizer>,
//! #     agent: Arc<dyn ConversationAgent>,
//! #     synthesizer: Arc<dyn Synthesizer>,
//! #     audio: AudioStream,
//! # ) -> voxline::error::Result<()> {
//! let pipeline = VoicePipeline::new(recognizer, agent, synthesizer);
//! let mut events = pipeline.run(audio);
//! while let Some(event) = events.next().await {
//!     println!("{}", event?.to_wire()?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod audio;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod prelude;
pub mod stream;
pub mod types;

#[cfg(feature = "server")]
pub mod server;
