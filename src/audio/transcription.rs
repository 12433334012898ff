//! Streaming speech recognizer contract.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::Connection;
use crate::error::Result;

/// Output of a streaming recognizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEvent {
    /// Interim hypothesis; may be revised.
    Partial(String),
    /// Finalized utterance.
    Final(String),
}

/// One recognizer connection, owned by a single pipeline.
#[async_trait]
pub trait Recognizer: Connection {
    /// Forward one audio frame. Fails with a transport error when the
    /// connection is broken.
    async fn send_audio(&self, audio: Vec<u8>) -> Result<()>;

    /// Transcript events, emitted on the recognizer's own schedule.
    ///
    /// Called once per connection. The stream ends after [`Connection::close`].
    fn events(&self) -> BoxStream<'static, Result<RecognizerEvent>>;
}
