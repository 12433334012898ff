//! Configuration system (layered: code > env > `.env` file).

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, VoxlineError};
use crate::pipeline::{FlushPolicy, PipelineOptions};

pub const DEFAULT_AGENT_MODEL: &str = "gemini-flash-latest";
pub const DEFAULT_AGENT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai/";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8000";

/// Settings for the OpenAI-compatible conversational agent.
#[derive(Clone)]
pub struct AgentConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub system_prompt: Option<String>,
}

impl fmt::Debug for AgentConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| ".."))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("system_prompt", &self.system_prompt)
            .finish()
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_AGENT_MODEL.to_string(),
            base_url: DEFAULT_AGENT_BASE_URL.to_string(),
            system_prompt: None,
        }
    }
}

/// Process-level configuration.
#[derive(Debug, Clone)]
pub struct VoxlineConfig {
    /// Address the WebSocket server listens on.
    pub bind_addr: String,
    pub agent: AgentConfig,
    pub pipeline: PipelineOptions,
}

impl Default for VoxlineConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            agent: AgentConfig::default(),
            pipeline: PipelineOptions::default(),
        }
    }
}

impl VoxlineConfig {
    /// Load from the process environment, reading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv(); // a missing .env is fine
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from a specific env file. Process environment variables win over
    /// values in the file.
    pub fn from_env_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let entries = dotenvy::from_path_iter(path).map_err(|e| {
            VoxlineError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        let mut file_vars = HashMap::new();
        for entry in entries {
            let (key, value) = entry.map_err(|e| {
                VoxlineError::Configuration(format!("malformed {}: {e}", path.display()))
            })?;
            file_vars.insert(key, value);
        }
        Self::from_lookup(|key| std::env::var(key).ok().or_else(|| file_vars.get(key).cloned()))
    }

    /// Build from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("VOXLINE_BIND_ADDR") {
            config.bind_addr = addr;
        }

        config.agent.api_key = lookup("GEMINI_API_KEY").filter(|key| !key.is_empty());
        if let Some(model) = lookup("GEMINI_DEFAULT_MODEL") {
            config.agent.model = model;
        }
        if let Some(url) = lookup("GEMINI_BASE_URL") {
            config.agent.base_url = url;
        }
        config.agent.system_prompt = lookup("VOXLINE_SYSTEM_PROMPT");

        if let Some(raw) = lookup("VOXLINE_FLUSH_EMPTY_TURNS") {
            config.pipeline.flush_policy = if parse_bool("VOXLINE_FLUSH_EMPTY_TURNS", &raw)? {
                FlushPolicy::Always
            } else {
                FlushPolicy::SkipEmpty
            };
        }
        if let Some(raw) = lookup("VOXLINE_ECHO_USER_INPUT") {
            config.pipeline.echo_user_input = parse_bool("VOXLINE_ECHO_USER_INPUT", &raw)?;
        }
        if let Some(raw) = lookup("VOXLINE_MERGE_CAPACITY") {
            let capacity: usize = parse_number("VOXLINE_MERGE_CAPACITY", &raw)?;
            if capacity == 0 {
                return Err(VoxlineError::Configuration(
                    "VOXLINE_MERGE_CAPACITY must be at least 1".into(),
                ));
            }
            config.pipeline.merge.capacity = capacity;
        }
        if let Some(raw) = lookup("VOXLINE_SHUTDOWN_GRACE_MS") {
            let millis: u64 = parse_number("VOXLINE_SHUTDOWN_GRACE_MS", &raw)?;
            config.pipeline.merge.shutdown_grace = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(VoxlineError::Configuration(format!(
            "{key}: expected a boolean, got '{other}'"
        ))),
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| VoxlineError::Configuration(format!("{key}: {e}")))
}
