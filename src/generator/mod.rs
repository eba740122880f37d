//! Chat-completion clients used to write answers.
pub mod openai;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from the answer-generation call.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("chat completion request failed: {0}")]
    Transport(String),

    #[error("chat completion request timed out")]
    Timeout,

    #[error("chat completion API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("chat completion response had no content")]
    EmptyResponse,

    #[error("malformed chat completion response: {0}")]
    Malformed(String),
}

impl GenerationError {
    /// Transient failures worth another attempt when retries are enabled.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyResponse | Self::Malformed(_) => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single-shot chat completion: one request, one answer, no streaming.
pub trait ChatClient: Send + Sync {
    fn complete(&self, messages: &[ChatMessage]) -> Result<String, GenerationError>;
}
