//! Turn-dispatch stage: passthrough plus one agent turn per final transcript.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tracing::debug;
use uuid::Uuid;

use super::EventStream;
use crate::agent::{AgentMessage, AgentTurnStream, ConversationAgent};
use crate::error::{Result, VoxlineError};
use crate::types::{SessionKey, VoiceEvent};

/// Forward every upstream event and run agent turns inline.
///
/// Each `TranscriptFinal` queues one turn under `session`. Turns run one at
/// a time; their events are interleaved with continued passthrough, and each
/// turn ends with exactly one `AssistantTurnEnd`. A failing turn fails the
/// stage.
pub fn dispatch_turns(
    agent: Arc<dyn ConversationAgent>,
    session: SessionKey,
    upstream: EventStream,
) -> EventStream {
    let lease = SessionLease {
        agent: Arc::clone(&agent),
        session,
    };
    Box::pin(dispatch_stream(agent, lease, upstream))
}

/// Map one agent message to pipeline events, preserving the agent's order.
pub fn message_events(message: AgentMessage) -> Vec<VoiceEvent> {
    match message {
        AgentMessage::Assistant { text, tool_calls } => {
            let mut events = Vec::with_capacity(tool_calls.len() + 1);
            if !text.is_empty() {
                events.push(VoiceEvent::assistant_delta(text));
            }
            for call in tool_calls {
                let id = call.id.unwrap_or_else(|| Uuid::new_v4().to_string());
                events.push(VoiceEvent::tool_invoked(id, call.name, call.args));
            }
            events
        }
        AgentMessage::ToolResult {
            call_id,
            name,
            result,
        } => vec![VoiceEvent::tool_completed(call_id, name, result)],
    }
}

enum Step {
    Upstream(Option<Result<VoiceEvent>>),
    Turn(Option<Result<AgentMessage>>),
}

/// Releases the agent's per-session state when the stage goes away.
struct SessionLease {
    agent: Arc<dyn ConversationAgent>,
    session: SessionKey,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.agent.end_session(&self.session);
    }
}

async fn next_turn_item(active: &mut Option<AgentTurnStream>) -> Option<Result<AgentMessage>> {
    match active {
        Some(turn) => turn.next().await,
        None => std::future::pending().await,
    }
}

fn dispatch_stream(
    agent: Arc<dyn ConversationAgent>,
    lease: SessionLease,
    mut upstream: EventStream,
) -> impl Stream<Item = Result<VoiceEvent>> + Send + 'static {
    async_stream::stream! {
        let session = lease.session;
        let _lease = lease;
        let mut pending: VecDeque<String> = VecDeque::new();
        let mut active: Option<AgentTurnStream> = None;
        let mut upstream_open = true;
        let mut turns = 0u64;

        loop {
            if active.is_none() {
                if let Some(text) = pending.pop_front() {
                    turns += 1;
                    debug!(%session, turn = turns, "agent turn started");
                    active = Some(agent.run_turn(&session, &text));
                }
            }
            if !upstream_open && active.is_none() {
                break;
            }

            let step = tokio::select! {
                next = upstream.next(), if upstream_open => Step::Upstream(next),
                item = next_turn_item(&mut active) => Step::Turn(item),
            };
            match step {
                Step::Upstream(Some(Ok(event))) => {
                    if let VoiceEvent::TranscriptFinal { transcript, .. } = &event {
                        pending.push_back(transcript.clone());
                    }
                    yield Ok(event);
                }
                Step::Upstream(Some(Err(error))) => {
                    yield Err(error);
                    return;
                }
                Step::Upstream(None) => upstream_open = false,
                Step::Turn(Some(Ok(message))) => {
                    for event in message_events(message) {
                        yield Ok(event);
                    }
                }
                Step::Turn(Some(Err(error))) => {
                    yield Err(VoxlineError::turn_failed(error));
                    return;
                }
                Step::Turn(None) => {
                    active = None;
                    debug!(%session, turn = turns, "agent turn finished");
                    yield Ok(VoiceEvent::assistant_turn_end());
                }
            }
        }
        debug!(%session, turns, "turn dispatch finished");
    }
}
