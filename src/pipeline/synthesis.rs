//! Synthesis stage: buffer assistant text per turn, flush it to the
//! synthesizer on turn end, and fan in the synthesizer's audio.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::debug;

use super::{EventStream, FlushPolicy};
use crate::audio::Synthesizer;
use crate::error::{Collaborator, Result};
use crate::stream::{merge_streams_with, ConnectionGuard, MergeOptions};
use crate::types::VoiceEvent;

type SynthesizerGuard = Arc<ConnectionGuard<dyn Synthesizer>>;

/// Text fragments accumulated for the turn in progress.
#[derive(Debug, Default)]
pub struct TurnBuffer {
    fragments: Vec<String>,
}

impl TurnBuffer {
    pub fn push(&mut self, text: &str) {
        self.fragments.push(text.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.iter().all(String::is_empty)
    }

    /// Concatenated text; the buffer is empty afterwards.
    pub fn take(&mut self) -> String {
        let text = self.fragments.concat();
        self.fragments.clear();
        text
    }
}

/// Pass `upstream` through while sending each turn's text to `synthesizer`.
///
/// The output is the fan-in of the passthrough and the synthesizer's own
/// audio stream, so audio for one turn may interleave with later upstream
/// events. Every `SynthesizedAudio` for a turn arrives after that turn's
/// `AssistantTurnEnd`. The synthesizer is closed exactly once on every exit
/// path.
pub fn synthesize(
    synthesizer: Arc<dyn Synthesizer>,
    upstream: EventStream,
    flush_policy: FlushPolicy,
    merge: MergeOptions,
) -> EventStream {
    let guard = Arc::new(ConnectionGuard::new(Collaborator::Synthesizer, synthesizer));
    Box::pin(synthesis_stream(guard, upstream, flush_policy, merge))
}

fn synthesis_stream(
    guard: SynthesizerGuard,
    upstream: EventStream,
    flush_policy: FlushPolicy,
    merge: MergeOptions,
) -> impl Stream<Item = Result<VoiceEvent>> + Send + 'static {
    async_stream::stream! {
        let audio = guard
            .connection()
            .events()
            .map(|chunk| chunk.map(VoiceEvent::synthesized_audio));
        let relay = relay_upstream(Arc::clone(&guard), upstream, flush_policy);

        let mut merged = merge_streams_with(vec![relay.boxed(), audio.boxed()], merge);
        while let Some(item) = merged.next().await {
            match item {
                Ok(event) => yield Ok(event),
                Err(error) => {
                    guard.close().await;
                    yield Err(error);
                    return;
                }
            }
        }
        guard.close().await;
    }
}

fn relay_upstream(
    guard: SynthesizerGuard,
    mut upstream: EventStream,
    flush_policy: FlushPolicy,
) -> impl Stream<Item = Result<VoiceEvent>> + Send + 'static {
    async_stream::stream! {
        let mut buffer = TurnBuffer::default();
        while let Some(item) = upstream.next().await {
            let event = match item {
                Ok(event) => event,
                Err(error) => {
                    yield Err(error);
                    return;
                }
            };
            let flush = match &event {
                VoiceEvent::AssistantDelta { text, .. } => {
                    buffer.push(text);
                    false
                }
                VoiceEvent::AssistantTurnEnd { .. } => true,
                VoiceEvent::UserInput { .. }
                | VoiceEvent::TranscriptPartial { .. }
                | VoiceEvent::TranscriptFinal { .. }
                | VoiceEvent::ToolInvoked { .. }
                | VoiceEvent::ToolCompleted { .. }
                | VoiceEvent::SynthesizedAudio { .. } => false,
            };

            // Forward first so the turn end reaches the merger ahead of any
            // audio the flush produces.
            yield Ok(event);

            if flush {
                if flush_policy == FlushPolicy::SkipEmpty && buffer.is_empty() {
                    buffer.take();
                    debug!("turn produced no text, skipping synthesis");
                    continue;
                }
                let text = buffer.take();
                debug!(chars = text.len(), "flushing turn text to synthesizer");
                if let Err(error) = guard.connection().send_text(text).await {
                    yield Err(error);
                    return;
                }
            }
        }
        debug!("upstream ended, finalizing synthesizer");
        guard.close().await;
    }
}
