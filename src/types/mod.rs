//! Core data types: pipeline events and sessions.

pub mod event;
pub mod session;

pub use event::{now_ms, VoiceEvent};
pub use session::SessionKey;
