//! Convenience re-exports for common use.

pub use crate::agent::{AgentMessage, ConversationAgent, FunctionTool, Tool, ToolInvocation, ToolParameters};
pub use crate::audio::{Connection, Recognizer, RecognizerEvent, Synthesizer};
pub use crate::config::{AgentConfig, VoxlineConfig};
pub use crate::error::{Result, VoxlineError};
pub use crate::pipeline::{AudioStream, EventStream, FlushPolicy, PipelineOptions, VoicePipeline};
pub use crate::stream::{merge_streams, MergeOptions};
pub use crate::types::{SessionKey, VoiceEvent};

#[cfg(feature = "openai")]
pub use crate::agent::ChatAgent;

#[cfg(feature = "server")]
pub use crate::server::{PipelineFactory, VoiceServer};
