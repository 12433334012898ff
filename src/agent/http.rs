//! HTTP helpers for the chat agent: headers, error mapping, SSE framing.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};

use crate::error::VoxlineError;

/// Default headers for a Bearer-token API.
pub(crate) fn bearer_headers(api_key: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Ok(val) = HeaderValue::from_str(&format!("Bearer {api_key}")) {
        headers.insert(AUTHORIZATION, val);
    }
    headers
}

/// Map a non-success HTTP status to an error.
pub(crate) fn status_to_error(status: u16, body: &str) -> VoxlineError {
    match status {
        401 | 403 => VoxlineError::Configuration(format!(
            "agent API rejected credentials (status {status}): {body}"
        )),
        _ => VoxlineError::Api {
            status,
            message: body.to_string(),
        },
    }
}

/// Incremental decoder for `text/event-stream` bodies.
///
/// Buffers raw bytes so multi-byte characters split across chunks survive,
/// and yields the payload of each `data:` line. `[DONE]` is dropped.
#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub(crate) fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut payloads = Vec::new();
        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            if let Some(data) = parse_sse_data(line.trim()) {
                payloads.push(data.to_string());
            }
        }
        payloads
    }
}

fn parse_sse_data(line: &str) -> Option<&str> {
    let data = line.strip_prefix("data:")?.trim_start();
    if data.is_empty() || data == "[DONE]" {
        return None;
    }
    Some(data)
}
