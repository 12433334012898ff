//! Ingestion stage: raw audio frames in, transcript events out.

use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tracing::{debug, warn};

use super::{AudioStream, EventStream};
use crate::audio::{Recognizer, RecognizerEvent};
use crate::error::{Collaborator, Result, VoxlineError};
use crate::stream::guard::AbortOnDrop;
use crate::stream::ConnectionGuard;
use crate::types::VoiceEvent;

const ECHO_CAPACITY: usize = 16;

type RecognizerGuard = Arc<ConnectionGuard<dyn Recognizer>>;

/// Run `audio` through `recognizer`.
///
/// Audio forwarding runs on its own task so it never waits on transcript
/// draining, and vice versa. When the audio input ends the recognizer is
/// closed (finalized) and the stage keeps draining until the recognizer's
/// event stream ends. The recognizer is closed exactly once on every exit
/// path.
pub fn transcribe(
    recognizer: Arc<dyn Recognizer>,
    audio: AudioStream,
    echo_user_input: bool,
) -> EventStream {
    // Built before the stream is first polled so an unpolled stage still
    // closes the recognizer when dropped.
    let guard = Arc::new(ConnectionGuard::new(Collaborator::Recognizer, recognizer));
    Box::pin(ingest_stream(guard, audio, echo_user_input))
}

enum Step {
    Forwarded(std::result::Result<Result<()>, JoinError>),
    Echo(Option<Vec<u8>>),
    Transcript(Option<Result<RecognizerEvent>>),
}

fn ingest_stream(
    guard: RecognizerGuard,
    audio: AudioStream,
    echo_user_input: bool,
) -> impl Stream<Item = Result<VoiceEvent>> + Send + 'static {
    async_stream::stream! {
        let mut transcripts = guard.connection().events();

        let (echo_tx, mut echo_rx) = mpsc::channel(ECHO_CAPACITY);
        let echo_tx = echo_user_input.then_some(echo_tx);
        let mut echo_open = echo_user_input;

        let mut forward = tokio::spawn(forward_audio(Arc::clone(&guard), audio, echo_tx));
        let _abort_forward = AbortOnDrop(forward.abort_handle());
        let mut forwarding = true;
        let mut transcribing = true;

        while forwarding || echo_open || transcribing {
            let step = tokio::select! {
                joined = &mut forward, if forwarding => Step::Forwarded(joined),
                frame = echo_rx.recv(), if echo_open => Step::Echo(frame),
                next = transcripts.next(), if transcribing => Step::Transcript(next),
            };
            match step {
                Step::Forwarded(Ok(Ok(()))) => forwarding = false,
                Step::Forwarded(Ok(Err(error))) => {
                    warn!(%error, "sending audio to recognizer failed");
                    guard.close().await;
                    yield Err(error);
                    return;
                }
                Step::Forwarded(Err(error)) => {
                    guard.close().await;
                    yield Err(VoxlineError::Stream(format!("audio forwarding task failed: {error}")));
                    return;
                }
                Step::Echo(Some(frame)) => yield Ok(VoiceEvent::user_input(frame)),
                Step::Echo(None) => echo_open = false,
                Step::Transcript(Some(Ok(RecognizerEvent::Partial(text)))) => {
                    yield Ok(VoiceEvent::transcript_partial(text));
                }
                Step::Transcript(Some(Ok(RecognizerEvent::Final(text)))) => {
                    yield Ok(VoiceEvent::transcript_final(text));
                }
                Step::Transcript(Some(Err(error))) => {
                    warn!(%error, "recognizer event stream failed");
                    guard.close().await;
                    yield Err(error);
                    return;
                }
                Step::Transcript(None) => transcribing = false,
            }
        }

        debug!("recognizer stream ended");
        guard.close().await;
    }
}

async fn forward_audio(
    guard: RecognizerGuard,
    mut audio: AudioStream,
    echo: Option<mpsc::Sender<Vec<u8>>>,
) -> Result<()> {
    let mut frames = 0u64;
    while let Some(frame) = audio.next().await {
        if let Some(echo) = &echo {
            // Receiver only goes away when the stage itself is shutting down.
            let _ = echo.send(frame.clone()).await;
        }
        guard.connection().send_audio(frame).await?;
        frames += 1;
    }
    debug!(frames, "audio input ended, finalizing recognizer");
    guard.close().await;
    Ok(())
}
