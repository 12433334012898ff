//! Pipeline event model and its wire encoding.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::Result;

/// Milliseconds since the Unix epoch, used to stamp events.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// An event flowing through the voice pipeline.
///
/// Every variant carries `ts`, the creation time in epoch milliseconds. It is
/// for client-side display only; pipeline ordering is arrival order.
///
/// Serializes to a JSON object tagged by `type` (see [`VoiceEvent::to_wire`]).
#[derive(Debug, Clone, PartialEq, Serialize, strum::IntoStaticStr)]
#[serde(tag = "type")]
pub enum VoiceEvent {
    /// Echo of one raw audio frame received from the client.
    #[serde(rename = "user_input")]
    #[strum(serialize = "user_input")]
    UserInput {
        #[serde(skip)]
        audio: Vec<u8>,
        ts: i64,
    },
    /// Interim recognizer output; never triggers a turn.
    #[serde(rename = "stt_chunk")]
    #[strum(serialize = "stt_chunk")]
    TranscriptPartial { transcript: String, ts: i64 },
    /// Finalized recognizer output; triggers one agent turn.
    #[serde(rename = "stt_output")]
    #[strum(serialize = "stt_output")]
    TranscriptFinal { transcript: String, ts: i64 },
    #[serde(rename = "agent_chunk")]
    #[strum(serialize = "agent_chunk")]
    AssistantDelta { text: String, ts: i64 },
    /// Marks the end of one agent turn.
    #[serde(rename = "agent_end")]
    #[strum(serialize = "agent_end")]
    AssistantTurnEnd { ts: i64 },
    #[serde(rename = "tool_call")]
    #[strum(serialize = "tool_call")]
    ToolInvoked {
        id: String,
        name: String,
        args: Map<String, Value>,
        ts: i64,
    },
    #[serde(rename = "tool_result")]
    #[strum(serialize = "tool_result")]
    ToolCompleted {
        #[serde(rename = "toolCallId")]
        tool_call_id: String,
        name: String,
        result: String,
        ts: i64,
    },
    #[serde(rename = "tts_chunk")]
    #[strum(serialize = "tts_chunk")]
    SynthesizedAudio {
        #[serde(with = "base64_audio")]
        audio: Vec<u8>,
        ts: i64,
    },
}

impl VoiceEvent {
    pub fn user_input(audio: Vec<u8>) -> Self {
        Self::UserInput { audio, ts: now_ms() }
    }

    pub fn transcript_partial(transcript: impl Into<String>) -> Self {
        Self::TranscriptPartial {
            transcript: transcript.into(),
            ts: now_ms(),
        }
    }

    pub fn transcript_final(transcript: impl Into<String>) -> Self {
        Self::TranscriptFinal {
            transcript: transcript.into(),
            ts: now_ms(),
        }
    }

    pub fn assistant_delta(text: impl Into<String>) -> Self {
        Self::AssistantDelta {
            text: text.into(),
            ts: now_ms(),
        }
    }

    pub fn assistant_turn_end() -> Self {
        Self::AssistantTurnEnd { ts: now_ms() }
    }

    pub fn tool_invoked(
        id: impl Into<String>,
        name: impl Into<String>,
        args: Map<String, Value>,
    ) -> Self {
        Self::ToolInvoked {
            id: id.into(),
            name: name.into(),
            args,
            ts: now_ms(),
        }
    }

    pub fn tool_completed(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        result: impl Into<String>,
    ) -> Self {
        Self::ToolCompleted {
            tool_call_id: tool_call_id.into(),
            name: name.into(),
            result: result.into(),
            ts: now_ms(),
        }
    }

    pub fn synthesized_audio(audio: Vec<u8>) -> Self {
        Self::SynthesizedAudio { audio, ts: now_ms() }
    }

    /// Creation timestamp in epoch milliseconds.
    pub fn ts(&self) -> i64 {
        match self {
            Self::UserInput { ts, .. }
            | Self::TranscriptPartial { ts, .. }
            | Self::TranscriptFinal { ts, .. }
            | Self::AssistantDelta { ts, .. }
            | Self::AssistantTurnEnd { ts }
            | Self::ToolInvoked { ts, .. }
            | Self::ToolCompleted { ts, .. }
            | Self::SynthesizedAudio { ts, .. } => *ts,
        }
    }

    /// Wire discriminant (the `type` field).
    pub fn event_type(&self) -> &'static str {
        self.into()
    }

    /// Encode as a JSON object.
    pub fn to_json(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Encode as a JSON text frame.
    pub fn to_wire(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

mod base64_audio {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(audio: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(audio))
    }
}
