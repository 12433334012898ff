//! The streaming voice pipeline: ingestion → turn dispatch → synthesis.
//!
//! Every stage is a lazy stream over the previous stage's output, so the
//! composed stream pulls audio only as fast as its consumer reads events.
//! Dropping the composed stream cancels all three stages and closes every
//! collaborator connection.

pub mod dispatch;
pub mod ingest;
pub mod synthesis;

pub use dispatch::{dispatch_turns, message_events};
pub use ingest::transcribe;
pub use synthesis::{synthesize, TurnBuffer};

use std::sync::Arc;

use futures::stream::BoxStream;
use tracing::debug;

use crate::agent::ConversationAgent;
use crate::audio::{Recognizer, Synthesizer};
use crate::stream::{MergeOptions, SourceStream};
use crate::types::{SessionKey, VoiceEvent};

/// Raw audio frames from the client; ends when the client stops sending.
pub type AudioStream = BoxStream<'static, Vec<u8>>;

/// Pipeline output, and the input of every stage after ingestion.
pub type EventStream = SourceStream<VoiceEvent>;

/// When buffered turn text is sent to the synthesizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushPolicy {
    /// Skip the synthesis request when a turn produced no text.
    #[default]
    SkipEmpty,
    /// Send a request on every turn end, even with empty text.
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineOptions {
    /// Emit `UserInput` for every inbound audio frame.
    pub echo_user_input: bool,
    pub flush_policy: FlushPolicy,
    /// Fan-in settings for the synthesis stage.
    pub merge: MergeOptions,
}

/// One connection's pipeline: a session key plus its collaborator handles.
pub struct VoicePipeline {
    session: SessionKey,
    recognizer: Arc<dyn Recognizer>,
    agent: Arc<dyn ConversationAgent>,
    synthesizer: Arc<dyn Synthesizer>,
    options: PipelineOptions,
}

impl VoicePipeline {
    /// Create a pipeline with a fresh session key.
    pub fn new(
        recognizer: Arc<dyn Recognizer>,
        agent: Arc<dyn ConversationAgent>,
        synthesizer: Arc<dyn Synthesizer>,
    ) -> Self {
        Self {
            session: SessionKey::new(),
            recognizer,
            agent,
            synthesizer,
            options: PipelineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn session(&self) -> SessionKey {
        self.session
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Compose the three stages over `audio`.
    pub fn run(self, audio: AudioStream) -> EventStream {
        debug!(session = %self.session, "pipeline start");
        let transcripts = transcribe(self.recognizer, audio, self.options.echo_user_input);
        let turns = dispatch_turns(self.agent, self.session, transcripts);
        synthesize(
            self.synthesizer,
            turns,
            self.options.flush_policy,
            self.options.merge,
        )
    }
}
