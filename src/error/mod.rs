//! Error types for voxline.

use thiserror::Error;

/// External collaborator a transport failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Collaborator {
    Recognizer,
    Agent,
    Synthesizer,
    Client,
}

/// Broad error category, used for log routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Transport,
    TurnExecution,
    Api,
    Configuration,
    Serialization,
    ToolExecution,
    Internal,
}

/// Primary error type for all voxline operations.
#[derive(Error, Debug)]
pub enum VoxlineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error ({collaborator}): {message}")]
    Transport {
        collaborator: Collaborator,
        message: String,
    },

    #[error("Agent turn failed: {message}")]
    TurnExecution {
        message: String,
        #[source]
        source: Option<Box<VoxlineError>>,
    },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[cfg(feature = "openai")]
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[cfg(feature = "server")]
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Tool execution error: {tool_name}: {message}")]
    ToolExecution { tool_name: String, message: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl VoxlineError {
    /// A collaborator connection was lost or refused a request.
    pub fn transport(collaborator: Collaborator, message: impl Into<String>) -> Self {
        Self::Transport {
            collaborator,
            message: message.into(),
        }
    }

    /// Wrap a failure raised while an agent turn was executing.
    ///
    /// Errors that are already turn failures pass through unchanged.
    pub fn turn_failed(error: VoxlineError) -> Self {
        match error {
            Self::TurnExecution { .. } => error,
            other => Self::TurnExecution {
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport { .. } | Self::Io(_) => ErrorCategory::Transport,
            #[cfg(feature = "openai")]
            Self::Network(_) => ErrorCategory::Transport,
            #[cfg(feature = "server")]
            Self::WebSocket(_) => ErrorCategory::Transport,
            Self::TurnExecution { .. } => ErrorCategory::TurnExecution,
            Self::Api { .. } => ErrorCategory::Api,
            Self::Configuration(_) => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::ToolExecution { .. } => ErrorCategory::ToolExecution,
            Self::Stream(_) | Self::InvalidState(_) => ErrorCategory::Internal,
        }
    }

    /// The collaborator this error is attributed to, if any.
    pub fn collaborator(&self) -> Option<Collaborator> {
        match self {
            Self::Transport { collaborator, .. } => Some(*collaborator),
            Self::TurnExecution { .. } => Some(Collaborator::Agent),
            _ => None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, VoxlineError>;
