//! Streaming speech synthesizer contract.

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::Connection;
use crate::error::Result;

/// One synthesizer connection, owned by a single pipeline.
#[async_trait]
pub trait Synthesizer: Connection {
    /// Submit one synthesis request. Fails with a transport error when the
    /// connection is broken.
    async fn send_text(&self, text: String) -> Result<()>;

    /// Synthesized audio chunks.
    ///
    /// Decoupled in time from `send_text`: audio for one request may still be
    /// arriving while later requests are submitted. Called once per
    /// connection; the stream ends after [`Connection::close`].
    fn events(&self) -> BoxStream<'static, Result<Vec<u8>>>;
}
