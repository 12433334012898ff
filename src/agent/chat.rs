//! OpenAI-compatible Chat Completions agent.
//!
//! Streams assistant text as it arrives, runs requested tools locally, and
//! loops until the model answers without tool calls. History is kept in
//! memory per session for the lifetime of the connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use super::http::{bearer_headers, status_to_error, SseDecoder};
use super::{AgentMessage, AgentTurnStream, ConversationAgent, Tool, ToolInvocation};
use crate::config::AgentConfig;
use crate::error::{Result, VoxlineError};
use crate::types::SessionKey;

const DEFAULT_MAX_STEPS: usize = 8;
/// Upper bound on tool-call slots per model reply.
const MAX_TOOL_CALLS: usize = 64;

type Histories = Arc<Mutex<HashMap<SessionKey, Vec<Value>>>>;

/// Conversational agent backed by a Chat Completions endpoint.
pub struct ChatAgent {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    tools: Arc<Vec<Arc<dyn Tool>>>,
    max_steps: usize,
    histories: Histories,
}

impl ChatAgent {
    /// Create an agent. Fails when no API key is configured.
    pub fn new(config: AgentConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            VoxlineError::Configuration("agent API key is not set (GEMINI_API_KEY)".into())
        })?;
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key,
            model: config.model,
            system_prompt: config.system_prompt,
            tools: Arc::new(Vec::new()),
            max_steps: DEFAULT_MAX_STEPS,
            histories: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        Arc::make_mut(&mut self.tools).push(tool);
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Upper bound on model calls per turn.
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Conversation history recorded for `session`.
    pub fn history(&self, session: &SessionKey) -> Vec<Value> {
        lock(&self.histories).get(session).cloned().unwrap_or_default()
    }
}

impl ConversationAgent for ChatAgent {
    fn run_turn(&self, session: &SessionKey, text: &str) -> AgentTurnStream {
        let turn = Turn {
            client: self.client.clone(),
            endpoint: self.endpoint.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            tools: Arc::clone(&self.tools),
            max_steps: self.max_steps,
            histories: Arc::clone(&self.histories),
        };
        Box::pin(turn_stream(turn, *session, text.to_string()))
    }

    fn end_session(&self, session: &SessionKey) {
        lock(&self.histories).remove(session);
    }
}

fn lock(histories: &Histories) -> std::sync::MutexGuard<'_, HashMap<SessionKey, Vec<Value>>> {
    histories.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct Turn {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    system_prompt: Option<String>,
    tools: Arc<Vec<Arc<dyn Tool>>>,
    max_steps: usize,
    histories: Histories,
}

impl Turn {
    fn load_history(&self, session: &SessionKey) -> Vec<Value> {
        let mut messages = lock(&self.histories).get(session).cloned().unwrap_or_default();
        if messages.is_empty() {
            if let Some(prompt) = &self.system_prompt {
                messages.push(json!({ "role": "system", "content": prompt }));
            }
        }
        messages
    }

    fn store_history(&self, session: SessionKey, messages: Vec<Value>) {
        lock(&self.histories).insert(session, messages);
    }

    fn request_body(&self, messages: &[Value]) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });
        if !self.tools.is_empty() {
            let defs: Vec<Value> = self
                .tools
                .iter()
                .map(|tool| {
                    json!({
                        "type": "function",
                        "function": {
                            "name": tool.name(),
                            "description": tool.description(),
                            "parameters": tool.parameters(),
                        }
                    })
                })
                .collect();
            body["tools"] = Value::Array(defs);
        }
        body
    }

    async fn send(&self, messages: &[Value]) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(&self.endpoint)
            .headers(bearer_headers(&self.api_key))
            .json(&self.request_body(messages))
            .send()
            .await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(status_to_error(status, &body));
        }
        Ok(response)
    }

    async fn execute_tool(&self, call: &ToolInvocation) -> String {
        let Some(tool) = self.tools.iter().find(|tool| tool.name() == call.name) else {
            warn!(tool = %call.name, "model requested an unknown tool");
            return format!("Error: unknown tool '{}'", call.name);
        };
        match tool.execute(&call.args).await {
            Ok(result) => result,
            Err(error) => {
                warn!(tool = %call.name, %error, "tool execution failed");
                format!("Error: {error}")
            }
        }
    }
}

fn turn_stream(
    turn: Turn,
    session: SessionKey,
    prompt: String,
) -> impl Stream<Item = Result<AgentMessage>> + Send + 'static {
    async_stream::try_stream! {
        debug!(%session, model = %turn.model, "agent turn start");
        let mut messages = turn.load_history(&session);
        messages.push(json!({ "role": "user", "content": prompt }));

        let mut completed = false;
        for step in 0..turn.max_steps {
            let response = turn.send(&messages).await?;
            let bytes = response.bytes_stream();
            futures::pin_mut!(bytes);

            let mut decoder = SseDecoder::default();
            let mut text = String::new();
            let mut pending = PendingToolCalls::default();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk?;
                for data in decoder.push(&chunk) {
                    let parsed = match serde_json::from_str::<StreamChunk>(&data) {
                        Ok(parsed) => parsed,
                        Err(error) => {
                            debug!(%error, "skipping unparseable stream chunk");
                            continue;
                        }
                    };
                    for choice in parsed.choices {
                        if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
                            text.push_str(&content);
                            yield AgentMessage::text(content);
                        }
                        pending.apply(choice.delta.tool_calls.unwrap_or_default());
                    }
                }
            }

            let invocations = pending.finish();
            messages.push(assistant_message(&text, &invocations));
            if invocations.is_empty() {
                completed = true;
                break;
            }

            debug!(%session, step, calls = invocations.len(), "agent requested tools");
            yield AgentMessage::Assistant {
                text: String::new(),
                tool_calls: invocations.clone(),
            };
            for call in invocations {
                let call_id = call.id.clone().unwrap_or_default();
                let result = turn.execute_tool(&call).await;
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": call_id,
                    "content": result,
                }));
                yield AgentMessage::ToolResult {
                    call_id,
                    name: call.name,
                    result,
                };
            }
        }

        if !completed {
            warn!(%session, max_steps = turn.max_steps, "agent turn hit the step limit");
        }
        turn.store_history(session, messages);
        debug!(%session, "agent turn complete");
    }
}

fn assistant_message(text: &str, invocations: &[ToolInvocation]) -> Value {
    if invocations.is_empty() {
        return json!({ "role": "assistant", "content": text });
    }
    let calls: Vec<Value> = invocations
        .iter()
        .map(|call| {
            json!({
                "id": call.id,
                "type": "function",
                "function": {
                    "name": call.name,
                    "arguments": Value::Object(call.args.clone()).to_string(),
                }
            })
        })
        .collect();
    json!({
        "role": "assistant",
        "content": if text.is_empty() { Value::Null } else { Value::String(text.to_string()) },
        "tool_calls": calls,
    })
}

/// Tool calls assembled from streamed fragments, keyed by stream index.
#[derive(Debug, Default)]
struct PendingToolCalls {
    calls: Vec<PartialToolCall>,
}

#[derive(Debug, Default)]
struct PartialToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

impl PendingToolCalls {
    fn apply(&mut self, deltas: Vec<ToolCallDelta>) {
        for (position, delta) in deltas.into_iter().enumerate() {
            let index = delta.index.unwrap_or(position);
            if index >= MAX_TOOL_CALLS {
                warn!(index, limit = MAX_TOOL_CALLS, "ignoring out-of-range tool call fragment");
                continue;
            }
            if self.calls.len() <= index {
                self.calls.resize_with(index + 1, PartialToolCall::default);
            }
            let call = &mut self.calls[index];
            if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                call.id = Some(id);
            }
            if let Some(function) = delta.function {
                if let Some(name) = function.name {
                    call.name.push_str(&name);
                }
                if let Some(arguments) = function.arguments {
                    call.arguments.push_str(&arguments);
                }
            }
        }
    }

    fn finish(self) -> Vec<ToolInvocation> {
        self.calls
            .into_iter()
            .filter(|call| !call.name.is_empty())
            .map(|call| ToolInvocation {
                id: Some(call.id.unwrap_or_else(|| format!("call_{}", Uuid::new_v4()))),
                args: parse_arguments(&call.name, &call.arguments),
                name: call.name,
            })
            .collect()
    }
}

fn parse_arguments(tool: &str, raw: &str) -> Map<String, Value> {
    if raw.trim().is_empty() {
        return Map::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(args)) => args,
        Ok(other) => {
            warn!(%tool, arguments = %other, "tool arguments are not an object");
            Map::new()
        }
        Err(error) => {
            warn!(%tool, %error, "tool arguments are not valid JSON");
            Map::new()
        }
    }
}

// Chat Completions streaming types (internal)

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    tool_calls: Option<Vec<ToolCallDelta>>,
}

#[derive(Deserialize)]
struct ToolCallDelta {
    index: Option<usize>,
    id: Option<String>,
    function: Option<FunctionDelta>,
}

#[derive(Deserialize)]
struct FunctionDelta {
    name: Option<String>,
    arguments: Option<String>,
}
