//! Speech collaborators: streaming recognition and synthesis connections.
//!
//! Both are opaque bidirectional services. Input is pushed through the
//! trait's send method while output arrives independently on the stream
//! returned by `events()`.

pub mod transcription;
pub mod tts;

pub use transcription::{Recognizer, RecognizerEvent};
pub use tts::Synthesizer;

use async_trait::async_trait;

use crate::error::Result;

/// A live connection to an external speech service.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Signal end of input and release the connection.
    ///
    /// Must be idempotent. After close, the `events()` stream yields whatever
    /// output is still pending and then ends. Errors are reported for logging
    /// only; callers treat close as always succeeding.
    async fn close(&self) -> Result<()>;
}
