//! Shared test helpers and scripted collaborators.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tokio::sync::{mpsc, Notify};
use tokio_stream::wrappers::UnboundedReceiverStream;

use voxline::agent::{AgentMessage, AgentTurnStream, ConversationAgent};
use voxline::audio::{Connection, Recognizer, RecognizerEvent, Synthesizer};
use voxline::error::{Collaborator, Result, VoxlineError};
use voxline::pipeline::{AudioStream, EventStream};
use voxline::stream::SourceStream;
use voxline::types::{SessionKey, VoiceEvent};

/// Set when the owning value is dropped.
#[derive(Debug, Clone, Default)]
pub struct DropFlag(Arc<AtomicBool>);

impl DropFlag {
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn arm(&self) -> DropTrip {
        DropTrip(self.clone())
    }
}

pub struct DropTrip(DropFlag);

impl Drop for DropTrip {
    fn drop(&mut self) {
        (self.0).0.store(true, Ordering::SeqCst);
    }
}

/// A source that never yields and records when it is dropped.
pub fn pending_source<T: Send + 'static>(flag: &DropFlag) -> SourceStream<T> {
    let trip = flag.arm();
    Box::pin(stream::pending::<Result<T>>().map(move |item| {
        let _trip = &trip;
        item
    }))
}

/// Poll `condition` until it holds, failing after two seconds.
pub async fn eventually(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Drain a pipeline stream into its events and optional terminal error.
pub async fn collect(mut events: EventStream) -> (Vec<VoiceEvent>, Option<VoxlineError>) {
    let mut collected = Vec::new();
    while let Some(item) = events.next().await {
        match item {
            Ok(event) => collected.push(event),
            Err(error) => return (collected, Some(error)),
        }
    }
    (collected, None)
}

pub fn kinds(events: &[VoiceEvent]) -> Vec<&'static str> {
    events.iter().map(VoiceEvent::event_type).collect()
}

/// Audio that ends after `frames`.
pub fn audio(frames: usize) -> AudioStream {
    Box::pin(stream::iter((0..frames).map(|i| vec![i as u8; 4])))
}

/// Audio fed by the test; ends when the sender is dropped.
pub fn live_audio() -> (mpsc::UnboundedSender<Vec<u8>>, AudioStream) {
    let (tx, rx) = mpsc::unbounded_channel();
    (tx, Box::pin(UnboundedReceiverStream::new(rx)))
}

/// Event output channel shared by the mock speech connections.
struct Outbox<T> {
    tx: Mutex<Option<mpsc::UnboundedSender<Result<T>>>>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<T>>>>,
}

impl<T: Send + 'static> Outbox<T> {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx: Mutex::new(Some(tx)),
            rx: Mutex::new(Some(rx)),
        }
    }

    fn push(&self, item: Result<T>) -> bool {
        match self.tx.lock().unwrap().as_ref() {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        }
    }

    fn finish(&self) {
        self.tx.lock().unwrap().take();
    }

    fn stream(&self) -> BoxStream<'static, Result<T>> {
        match self.rx.lock().unwrap().take() {
            Some(rx) => Box::pin(UnboundedReceiverStream::new(rx)),
            None => Box::pin(stream::empty()),
        }
    }
}

/// Recognizer that answers each audio frame with scripted transcripts.
pub struct MockRecognizer {
    script: Mutex<VecDeque<Vec<RecognizerEvent>>>,
    on_close: Mutex<Vec<RecognizerEvent>>,
    fail_on_frame: Option<usize>,
    stall: Option<(usize, Arc<Notify>)>,
    frames: AtomicUsize,
    closes: AtomicUsize,
    outbox: Outbox<RecognizerEvent>,
}

impl MockRecognizer {
    /// `script[i]` is emitted when frame `i` arrives.
    pub fn new(script: Vec<Vec<RecognizerEvent>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            on_close: Mutex::new(Vec::new()),
            fail_on_frame: None,
            stall: None,
            frames: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            outbox: Outbox::new(),
        }
    }

    /// Transcripts flushed only when the input is finalized.
    pub fn finalizing_with(self, events: Vec<RecognizerEvent>) -> Self {
        *self.on_close.lock().unwrap() = events;
        self
    }

    pub fn failing_on_frame(mut self, frame: usize) -> Self {
        self.fail_on_frame = Some(frame);
        self
    }

    /// After emitting frame `frame`'s transcripts, block `send_audio` until
    /// the gate is notified.
    pub fn stalling_on_frame(mut self, frame: usize, gate: Arc<Notify>) -> Self {
        self.stall = Some((frame, gate));
        self
    }

    /// Emit a stream failure on the event channel.
    pub fn break_stream(&self, message: &str) {
        self.outbox
            .push(Err(VoxlineError::transport(Collaborator::Recognizer, message)));
    }

    pub fn frames(&self) -> usize {
        self.frames.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connection for MockRecognizer {
    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        for event in self.on_close.lock().unwrap().drain(..) {
            self.outbox.push(Ok(event));
        }
        self.outbox.finish();
        Ok(())
    }
}

#[async_trait]
impl Recognizer for MockRecognizer {
    async fn send_audio(&self, _audio: Vec<u8>) -> Result<()> {
        let frame = self.frames.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_frame == Some(frame) {
            return Err(VoxlineError::transport(
                Collaborator::Recognizer,
                "recognizer socket reset",
            ));
        }
        let events = self.script.lock().unwrap().pop_front().unwrap_or_default();
        for event in events {
            if !self.outbox.push(Ok(event)) {
                return Err(VoxlineError::transport(
                    Collaborator::Recognizer,
                    "recognizer already closed",
                ));
            }
        }
        if let Some((_, gate)) = self.stall.as_ref().filter(|(at, _)| *at == frame) {
            gate.notified().await;
        }
        Ok(())
    }

    fn events(&self) -> BoxStream<'static, Result<RecognizerEvent>> {
        self.outbox.stream()
    }
}

/// Synthesizer that answers each request with one chunk: `audio:<text>`.
pub struct MockSynthesizer {
    requests: Mutex<Vec<String>>,
    hold_audio: bool,
    held: Mutex<Vec<Vec<u8>>>,
    fail_on_send: bool,
    close_error: bool,
    closes: AtomicUsize,
    outbox: Outbox<Vec<u8>>,
}

impl MockSynthesizer {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            hold_audio: false,
            held: Mutex::new(Vec::new()),
            fail_on_send: false,
            close_error: false,
            closes: AtomicUsize::new(0),
            outbox: Outbox::new(),
        }
    }

    /// Keep synthesized audio back until [`MockSynthesizer::release_audio`]
    /// or close.
    pub fn holding_audio(mut self) -> Self {
        self.hold_audio = true;
        self
    }

    pub fn release_audio(&self) {
        let held: Vec<Vec<u8>> = self.held.lock().unwrap().drain(..).collect();
        for chunk in held {
            self.outbox.push(Ok(chunk));
        }
    }

    pub fn failing_on_send(mut self) -> Self {
        self.fail_on_send = true;
        self
    }

    /// `close` reports an error (after closing).
    pub fn failing_on_close(mut self) -> Self {
        self.close_error = true;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn audio_for(text: &str) -> Vec<u8> {
        format!("audio:{text}").into_bytes()
    }
}

impl Default for MockSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connection for MockSynthesizer {
    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.release_audio();
        self.outbox.finish();
        if self.close_error {
            return Err(VoxlineError::transport(
                Collaborator::Synthesizer,
                "close handshake failed",
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Synthesizer for MockSynthesizer {
    async fn send_text(&self, text: String) -> Result<()> {
        if self.fail_on_send {
            return Err(VoxlineError::transport(
                Collaborator::Synthesizer,
                "synthesizer socket reset",
            ));
        }
        self.requests.lock().unwrap().push(text.clone());
        if self.hold_audio {
            self.held.lock().unwrap().push(Self::audio_for(&text));
        } else {
            self.outbox.push(Ok(Self::audio_for(&text)));
        }
        Ok(())
    }

    fn events(&self) -> BoxStream<'static, Result<Vec<u8>>> {
        self.outbox.stream()
    }
}

/// How one scripted agent turn behaves.
pub enum TurnScript {
    /// Yield these messages, then complete.
    Reply(Vec<AgentMessage>),
    /// Wait for the gate, then reply.
    Gated(Arc<Notify>, Vec<AgentMessage>),
    /// Yield the first messages, wait for the gate, then yield the rest.
    Paused(Vec<AgentMessage>, Arc<Notify>, Vec<AgentMessage>),
    /// Yield these messages, then fail.
    Fail(Vec<AgentMessage>, String),
    /// Yield these messages, then never complete.
    Hang(Vec<AgentMessage>, DropFlag),
}

impl TurnScript {
    pub fn text(fragments: &[&str]) -> Self {
        Self::Reply(fragments.iter().map(|f| AgentMessage::text(*f)).collect())
    }
}

/// Agent that plays scripted turns in order; unscripted turns are empty.
pub struct MockAgent {
    turns: Mutex<VecDeque<TurnScript>>,
    prompts: Mutex<Vec<(SessionKey, String)>>,
    ended: Mutex<Vec<SessionKey>>,
}

impl MockAgent {
    pub fn new(turns: Vec<TurnScript>) -> Self {
        Self {
            turns: Mutex::new(turns.into()),
            prompts: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn sessions(&self) -> Vec<SessionKey> {
        self.prompts.lock().unwrap().iter().map(|(s, _)| *s).collect()
    }

    pub fn ended_sessions(&self) -> Vec<SessionKey> {
        self.ended.lock().unwrap().clone()
    }
}

impl ConversationAgent for MockAgent {
    fn run_turn(&self, session: &SessionKey, text: &str) -> AgentTurnStream {
        self.prompts.lock().unwrap().push((*session, text.to_string()));
        let script = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TurnScript::Reply(Vec::new()));
        Box::pin(async_stream::stream! {
            match script {
                TurnScript::Reply(messages) => {
                    for message in messages {
                        yield Ok(message);
                    }
                }
                TurnScript::Gated(gate, messages) => {
                    gate.notified().await;
                    for message in messages {
                        yield Ok(message);
                    }
                }
                TurnScript::Paused(before, gate, after) => {
                    for message in before {
                        yield Ok(message);
                    }
                    gate.notified().await;
                    for message in after {
                        yield Ok(message);
                    }
                }
                TurnScript::Fail(messages, reason) => {
                    for message in messages {
                        yield Ok(message);
                    }
                    yield Err(VoxlineError::Api { status: 503, message: reason });
                }
                TurnScript::Hang(messages, flag) => {
                    let _trip = flag.arm();
                    for message in messages {
                        yield Ok(message);
                    }
                    futures::future::pending::<()>().await;
                }
            }
        })
    }

    fn end_session(&self, session: &SessionKey) {
        self.ended.lock().unwrap().push(*session);
    }
}

pub fn partial(text: &str) -> RecognizerEvent {
    RecognizerEvent::Partial(text.to_string())
}

pub fn final_(text: &str) -> RecognizerEvent {
    RecognizerEvent::Final(text.to_string())
}
