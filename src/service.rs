//! The language-model service boundary.

use async_trait::async_trait;
use thiserror::Error;

use crate::tools::ToolSpec;
use crate::transcript::{ToolCallRequest, TranscriptEntry};

/// One assistant turn returned by a chat backend.
///
/// May carry free text, tool-call requests, or both. A turn with neither is
/// malformed and the loop treats it as a service failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AssistantTurn {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl AssistantTurn {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallRequest>) -> Self {
        Self {
            content: None,
            tool_calls: calls,
        }
    }
}

/// Errors that can occur while talking to a chat backend.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A chat backend capable of producing one assistant turn per request.
///
/// The request carries the full transcript so far plus the registry's tool
/// declarations; retry policy, if any, belongs to the implementation, not
/// to the orchestration loop.
#[async_trait]
pub trait ChatService: Send + Sync {
    async fn complete(
        &self,
        model: &str,
        transcript: &[TranscriptEntry],
        tools: &[ToolSpec],
    ) -> Result<AssistantTurn, ServiceError>;
}
