//! Conversational-agent collaborator.
//!
//! The pipeline only sees [`ConversationAgent`]: run one turn for a piece of
//! text under a session, producing assistant text, tool invocations, and
//! tool results until the turn completes.

pub mod tool;

#[cfg(feature = "openai")]
pub mod chat;
#[cfg(feature = "openai")]
mod http;

pub use tool::{FunctionTool, Tool, ToolParameters};

#[cfg(feature = "openai")]
pub use chat::ChatAgent;

use futures::stream::BoxStream;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::types::SessionKey;

/// Items produced by one agent turn, in the agent's own order.
pub type AgentTurnStream = BoxStream<'static, Result<AgentMessage>>;

/// A tool call requested by the assistant.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Provider-assigned call id; a fresh one is generated when absent.
    pub id: Option<String>,
    pub name: String,
    pub args: Map<String, Value>,
}

/// One message emitted during a turn.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentMessage {
    /// Assistant output: incremental text, tool invocations, or both.
    Assistant {
        text: String,
        tool_calls: Vec<ToolInvocation>,
    },
    /// Result of one executed tool call.
    ToolResult {
        call_id: String,
        name: String,
        result: String,
    },
}

impl AgentMessage {
    /// Assistant text with no tool calls.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Assistant {
            text: text.into(),
            tool_calls: Vec::new(),
        }
    }
}

/// Turn-execution service.
///
/// Not reentrant per session: callers run at most one turn per
/// [`SessionKey`] at a time. Conversation state lives behind this trait.
pub trait ConversationAgent: Send + Sync {
    /// Start one turn. The returned stream is lazy and ends when the turn is
    /// complete; dropping it abandons the turn.
    fn run_turn(&self, session: &SessionKey, text: &str) -> AgentTurnStream;

    /// The connection owning `session` is gone; release any state kept for it.
    fn end_session(&self, _session: &SessionKey) {}
}
